//! Async driver
//!
//! Runs a [`MediaOverlayPlayer`] on its own tokio task. Commands, device
//! reports and timer expiries share one unbounded channel, which is what
//! serializes them: the player never sees two inputs at once.

use super::events::{PlayerCommand, PlayerEvent, PlayerInput, PositionSnapshot};
use super::orchestrator::MediaOverlayPlayer;
use crate::devices::Scheduler;
use crate::error::{Error, Result};
use mosync_common::PlayerSettings;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sending half of a player's input channel
pub type InputSender = mpsc::UnboundedSender<PlayerInput>;

/// Create the input channel for one player
pub fn player_channel() -> (PlayerHandle, mpsc::UnboundedReceiver<PlayerInput>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlayerHandle { tx }, rx)
}

/// Run `player` until `Shutdown` arrives or every sender is gone
pub fn spawn_player(
    mut player: MediaOverlayPlayer,
    mut rx: mpsc::UnboundedReceiver<PlayerInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Player task started (session {})", player.session_id());
        while let Some(input) = rx.recv().await {
            match input {
                PlayerInput::Command(command) => player.handle_command(command),
                PlayerInput::Event(event) => player.handle_event(event),
                PlayerInput::Snapshot(reply) => {
                    let _ = reply.send(player.position_snapshot());
                }
                PlayerInput::Shutdown => {
                    player.reset();
                    break;
                }
            }
        }
        info!("Player task stopped (session {})", player.session_id());
    })
}

/// Cloneable front end to a running player
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: InputSender,
}

impl PlayerHandle {
    /// Sender for devices to report into
    pub fn sender(&self) -> InputSender {
        self.tx.clone()
    }

    fn send(&self, input: PlayerInput) -> Result<()> {
        self.tx
            .send(input)
            .map_err(|_| Error::InvalidState("player task is not running".to_string()))
    }

    pub fn command(&self, command: PlayerCommand) -> Result<()> {
        self.send(PlayerInput::Command(command))
    }

    /// Deliver a device report
    pub fn event(&self, event: PlayerEvent) -> Result<()> {
        self.send(PlayerInput::Event(event))
    }

    pub fn play(&self) -> Result<()> {
        self.command(PlayerCommand::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.command(PlayerCommand::Pause)
    }

    pub fn toggle(&self) -> Result<()> {
        self.command(PlayerCommand::Toggle)
    }

    pub fn next(&self) -> Result<()> {
        self.command(PlayerCommand::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.command(PlayerCommand::Previous)
    }

    pub fn escape(&self) -> Result<()> {
        self.command(PlayerCommand::Escape)
    }

    pub fn reset(&self) -> Result<()> {
        self.command(PlayerCommand::Reset)
    }

    pub fn play_document(&self, document_id: impl Into<String>) -> Result<()> {
        self.command(PlayerCommand::PlayDocument {
            document_id: document_id.into(),
        })
    }

    pub fn play_fragment(&self, href: impl Into<String>, fragment_id: Option<String>) -> Result<()> {
        self.command(PlayerCommand::PlayFragment {
            href: href.into(),
            fragment_id,
        })
    }

    pub fn seek_percent(&self, percent: f64) -> Result<()> {
        self.command(PlayerCommand::SeekPercent { percent })
    }

    pub fn set_rate(&self, rate: f64) -> Result<()> {
        self.command(PlayerCommand::SetRate { rate })
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.command(PlayerCommand::SetVolume { volume })
    }

    pub fn set_auto_advance(&self, enabled: bool) -> Result<()> {
        self.command(PlayerCommand::SetAutoAdvance { enabled })
    }

    pub fn apply_settings(&self, settings: PlayerSettings) -> Result<()> {
        self.command(PlayerCommand::ApplySettings {
            settings: Box::new(settings),
        })
    }

    /// Current position, as seen once every earlier input is handled
    pub async fn snapshot(&self) -> Result<Option<PositionSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerInput::Snapshot(reply))?;
        rx.await
            .map_err(|_| Error::InvalidState("player task dropped the snapshot request".to_string()))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(PlayerInput::Shutdown)
    }
}

/// [`Scheduler`] that sleeps on the tokio runtime and posts the event back
/// into the player's channel
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: InputSender,
}

impl TokioScheduler {
    pub fn new(tx: InputSender) -> Self {
        Self { tx }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, event: PlayerEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(PlayerInput::Event(event)).is_err() {
                debug!("Player gone before a scheduled event fired");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scheduler_delivers_after_delay() {
        let (handle, mut rx) = player_channel();
        let mut scheduler = TokioScheduler::new(handle.sender());

        let started = tokio::time::Instant::now();
        scheduler.schedule(Duration::from_millis(30), PlayerEvent::DwellElapsed { generation: 9 });

        match rx.recv().await {
            Some(PlayerInput::Event(PlayerEvent::DwellElapsed { generation })) => {
                assert_eq!(generation, 9)
            }
            other => panic!("Expected dwell event, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_handle_errors_once_receiver_is_gone() {
        let (handle, rx) = player_channel();
        drop(rx);
        assert!(matches!(handle.play(), Err(Error::InvalidState(_))));
        assert!(handle.snapshot().await.is_err());
    }
}
