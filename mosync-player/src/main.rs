//! Media-overlay player (mosync-player) - Main entry point
//!
//! Plays a publication's timeline against simulated devices and logs every
//! highlight change. Useful for checking a timeline file end to end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mosync_common::events::PlaybackState;
use mosync_common::time::ms_to_secs;
use mosync_common::{EventBus, PlayerSettings, SyncEvent};
use mosync_player::playback::{player_channel, spawn_player, MediaOverlayPlayer};
use mosync_player::sim::sim_devices;
use mosync_player::TimelineAggregate;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mosync-player
#[derive(Parser, Debug)]
#[command(name = "mosync-player")]
#[command(about = "Media-overlay synchronization player")]
#[command(version)]
struct Args {
    /// Publication timeline (JSON)
    #[arg(short, long, env = "MOSYNC_TIMELINE")]
    timeline: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long, env = "MOSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Start at this publication percentage
    #[arg(long, conflicts_with = "document")]
    percent: Option<f64>,

    /// Start at this document (manifest id)
    #[arg(long)]
    document: Option<String>,

    /// Playback rate override
    #[arg(long)]
    rate: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosync_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut settings = PlayerSettings::resolve(args.config.as_deref())
        .context("Failed to load settings")?;
    if let Some(rate) = args.rate {
        settings.rate = rate;
    }

    let aggregate = Arc::new(
        TimelineAggregate::load(&args.timeline)
            .with_context(|| format!("Failed to load timeline {}", args.timeline.display()))?,
    );
    info!(
        "Loaded {} timelines, {:.1}s of narration",
        aggregate.len(),
        ms_to_secs(aggregate.duration_ms())
    );

    let events = EventBus::new(256);
    let mut rx_events = events.subscribe();

    let (handle, rx) = player_channel();
    let devices = sim_devices(handle.sender(), &aggregate);
    let player = MediaOverlayPlayer::new(aggregate, devices, settings, events);
    let task = spawn_player(player, rx);

    match (args.document, args.percent) {
        (Some(document), _) => handle.play_document(document)?,
        (None, Some(percent)) => {
            handle.seek_percent(percent)?;
            handle.play()?;
        }
        (None, None) => handle.play()?,
    }

    loop {
        tokio::select! {
            event = rx_events.recv() => match event {
                Ok(SyncEvent::PublicationEnded { .. }) => {
                    info!("Publication finished");
                    break;
                }
                Ok(SyncEvent::PlaybackStatus { state: PlaybackState::Stopped, diagnostic: Some(reason), .. }) => {
                    warn!("Playback stopped: {}", reason);
                    break;
                }
                Ok(SyncEvent::ChapterEntered { timeline_index, document_id, .. }) => {
                    info!("Chapter {} ({})", timeline_index, document_id.as_deref().unwrap_or("blank page"));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    if let Ok(Some(snapshot)) = handle.snapshot().await {
        info!("Stopped at {}", serde_json::to_string(&snapshot)?);
    }
    handle.shutdown()?;
    task.await.context("Player task panicked")?;
    Ok(())
}
