//! Core orchestrator - construction, rendering the current unit, lifecycle
//!
//! **Responsibilities:**
//! - MediaOverlayPlayer struct definition and construction
//! - `play_current`: turning the cursor's unit into audio, speech, embedded
//!   media or a blank-page dwell, plus its highlight
//! - Play / pause / reset and the document load handshake
//! - Dispatch of commands and device events

use super::seek::PendingSeek;
use crate::devices::{Devices, EmbeddedMediaHandle, HighlightTarget, LoadTicket};
use crate::playback::events::{PlayerCommand, PlayerEvent, PositionSource};
use crate::playback::state::{PlayerState, ResumeIntent, Sounding};
use crate::policy::SyncPolicy;
use crate::timeline::{AudioClip, Direction, NodeId, TimelineAggregate, TimelineCursor, TimelineTree, UnitRef};
use mosync_common::time::{self, millis_to_duration};
use mosync_common::{EventBus, PlayerSettings, SyncEvent};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Media-overlay playback orchestrator
///
/// Owns one cursor and one set of devices. Every input is handled to
/// completion before the next one, so there is no locking; inputs that belong
/// to a superseded operation are recognized by their generation or load
/// ticket and dropped.
pub struct MediaOverlayPlayer {
    pub(super) session_id: Uuid,

    pub(super) aggregate: Arc<TimelineAggregate>,

    pub(super) devices: Devices,

    pub(super) settings: PlayerSettings,

    pub(super) policy: SyncPolicy,

    pub(super) events: EventBus,

    pub(super) cursor: Option<TimelineCursor>,

    pub(super) state: PlayerState,

    /// Bumped by every operation that supersedes in-flight timers and seeks
    pub(super) generation: u64,

    pub(super) highlighted: Option<HighlightTarget>,

    /// Source currently loaded in the audio device
    pub(super) audio_src: Option<String>,

    /// Last reported audio position, seconds into `audio_src`
    pub(super) last_position: Option<f64>,

    pub(super) pending_seek: Option<PendingSeek>,

    /// Offset into the next audio clip started (percent seeks)
    pub(super) resume_offset_secs: Option<f64>,

    pub(super) embedded: Option<Box<dyn EmbeddedMediaHandle>>,

    /// Granularity container being spoken as one utterance
    pub(super) speech_scope: Option<NodeId>,

    /// Document the host currently renders
    pub(super) rendered_href: Option<String>,

    /// Consecutive device errors on the current unit
    pub(super) device_failures: u32,

    pub(super) next_ticket: u64,
}

impl MediaOverlayPlayer {
    pub fn new(
        aggregate: Arc<TimelineAggregate>,
        mut devices: Devices,
        settings: PlayerSettings,
        events: EventBus,
    ) -> Self {
        let settings = settings.normalized();
        let policy = SyncPolicy::new(&settings, &aggregate);
        devices.audio.set_rate(settings.rate);
        devices.audio.set_volume(settings.volume);

        let session_id = Uuid::new_v4();
        info!(
            "Media overlay session {} over {} documents (narrator: {})",
            session_id,
            aggregate.len(),
            aggregate.narrator().unwrap_or("unknown")
        );

        Self {
            session_id,
            aggregate,
            devices,
            settings,
            policy,
            events,
            cursor: None,
            state: PlayerState::Idle,
            generation: 0,
            highlighted: None,
            audio_src: None,
            last_position: None,
            pending_seek: None,
            resume_offset_secs: None,
            embedded: None,
            speech_scope: None,
            rendered_href: None,
            device_failures: 0,
            next_ticket: 0,
        }
    }

    /// Tell the player which document the host is showing
    pub fn set_rendered_document(&mut self, href: Option<String>) {
        self.rendered_href = href;
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub fn handle_command(&mut self, command: PlayerCommand) {
        debug!("Command {:?} in state {}", command, self.state);
        match command {
            PlayerCommand::Play => self.play(),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Toggle => self.toggle(),
            PlayerCommand::Next => self.next_overlay(),
            PlayerCommand::Previous => self.previous_overlay(),
            PlayerCommand::Escape => self.escape(),
            PlayerCommand::Reset => self.reset(),
            PlayerCommand::PlayDocument { document_id } => self.play_document(&document_id),
            PlayerCommand::PlayFragment { href, fragment_id } => {
                self.play_fragment(&href, fragment_id.as_deref())
            }
            PlayerCommand::SeekPercent { percent } => self.seek_percent(percent),
            PlayerCommand::SetRate { rate } => self.set_rate(rate),
            PlayerCommand::SetVolume { volume } => self.set_volume(volume),
            PlayerCommand::SetAutoAdvance { enabled } => self.set_auto_advance(enabled),
            PlayerCommand::ApplySettings { settings } => self.apply_settings(*settings),
        }
    }

    pub fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::AudioPosition { src, seconds } => self.on_audio_position(&src, seconds),
            PlayerEvent::AudioPlaying => {
                self.device_failures = 0;
                if let PlayerState::Paused {
                    sounding: Some(Sounding::Audio),
                    intent: ResumeIntent::Continue,
                } = self.state
                {
                    debug!("Audio resumed outside the player");
                    self.state = PlayerState::Playing(Sounding::Audio);
                    self.emit_status(None);
                }
            }
            PlayerEvent::AudioPaused => {
                if self.state == PlayerState::Playing(Sounding::Audio) {
                    debug!("Audio paused outside the player");
                    self.generation += 1;
                    self.pending_seek = None;
                    self.state = PlayerState::Paused {
                        sounding: Some(Sounding::Audio),
                        intent: ResumeIntent::Continue,
                    };
                    self.emit_status(None);
                }
            }
            PlayerEvent::AudioEnded => {
                if self.state == PlayerState::Playing(Sounding::Audio) {
                    debug!("Audio source {:?} ended", self.audio_src);
                    self.audio_src = None;
                    self.pending_seek = None;
                    self.advance(Direction::Forward, PositionSource::Playback);
                } else {
                    trace!("Ignoring audio end in state {}", self.state);
                }
            }
            PlayerEvent::AudioError { message } => {
                if self.state == PlayerState::Playing(Sounding::Audio) {
                    self.on_device_failure(Sounding::Audio, message);
                } else {
                    debug!("Ignoring audio error in state {}: {}", self.state, message);
                }
            }
            PlayerEvent::SpeechBoundary {
                char_index,
                char_length,
            } => {
                if self.state == PlayerState::Playing(Sounding::Speech) {
                    if let Some(target) = &self.highlighted {
                        self.devices
                            .highlighter
                            .highlight_range(target, char_index, char_length);
                    }
                }
            }
            PlayerEvent::SpeechEnded => {
                if self.state == PlayerState::Playing(Sounding::Speech) {
                    self.advance(Direction::Forward, PositionSource::Playback);
                } else {
                    trace!("Ignoring speech end in state {}", self.state);
                }
            }
            PlayerEvent::SpeechError { message } => {
                if self.state == PlayerState::Playing(Sounding::Speech) {
                    self.on_device_failure(Sounding::Speech, message);
                }
            }
            PlayerEvent::EmbeddedEnded => {
                if self.state == PlayerState::Playing(Sounding::Embedded) {
                    self.embedded = None;
                    self.advance(Direction::Forward, PositionSource::Playback);
                }
            }
            PlayerEvent::DocumentLoaded { ticket } => self.on_document_loaded(ticket),
            PlayerEvent::DocumentLoadFailed { ticket, reason } => {
                self.on_document_load_failed(ticket, reason)
            }
            PlayerEvent::DwellElapsed { generation } => {
                if generation == self.generation
                    && self.state == PlayerState::Playing(Sounding::BlankPage)
                {
                    debug!("Blank page dwell elapsed");
                    self.advance(Direction::Forward, PositionSource::Playback);
                } else {
                    trace!("Discarding stale dwell timer (generation {})", generation);
                }
            }
            PlayerEvent::SeekCheck { generation } => self.on_seek_check(generation),
        }
    }

    // ------------------------------------------------------------------
    // Rendering the current unit
    // ------------------------------------------------------------------

    /// Start whatever renders the cursor's current unit
    pub(super) fn play_current(&mut self) {
        self.generation += 1;
        self.pending_seek = None;

        let Some(cursor) = &self.cursor else {
            warn!("play_current without a cursor");
            return;
        };
        let Some(node) = cursor.current() else {
            debug!("Cursor exhausted, nothing to play");
            self.silence(None);
            self.state = PlayerState::Idle;
            self.emit_status(None);
            return;
        };
        let tree = cursor.tree().clone();
        let unit = UnitRef {
            tree: cursor.tree_index(),
            node,
        };

        // The host must show the document before its text can be highlighted
        if let Some(href) = tree.document_href() {
            if self.rendered_href.as_deref() != Some(href) {
                let anchor = tree.text_of(node).and_then(|t| t.fragment_id.clone());
                self.request_document(href.to_string(), anchor, true);
                return;
            }
        }

        if tree.is_blank() {
            self.silence(None);
            // The page itself is the unit being presented
            self.update_highlight(unit);
            self.speech_scope = None;
            self.state = PlayerState::Playing(Sounding::BlankPage);
            debug!(
                "Dwelling {} ms on blank page {:?}",
                self.settings.blank_page_dwell_ms,
                tree.document_href()
            );
            self.devices.scheduler.schedule(
                millis_to_duration(self.settings.blank_page_dwell_ms),
                PlayerEvent::DwellElapsed {
                    generation: self.generation,
                },
            );
            self.emit_status(None);
            return;
        }

        self.update_highlight(unit);

        let clip = tree
            .audio_of(node)
            .cloned()
            .unwrap_or_else(AudioClip::placeholder);
        match clip.src.as_deref() {
            Some(src) => self.play_audio(src, &clip),
            None => self.play_without_audio(&tree, unit),
        }
    }

    fn play_audio(&mut self, src: &str, clip: &AudioClip) {
        let start = clip.clip_begin + self.resume_offset_secs.take().unwrap_or(0.0);
        let was_playing = self.state == PlayerState::Playing(Sounding::Audio);
        self.silence(Some(Sounding::Audio));
        self.speech_scope = None;

        if self.audio_src.as_deref() == Some(src) {
            let at_start = self
                .last_position
                .map(|p| (p - start).abs() < self.settings.seek.threshold_secs)
                .unwrap_or(false);
            if was_playing && at_start {
                trace!("{} already at {:.3}s, continuing", src, start);
            } else {
                self.begin_seek(start);
                if !was_playing {
                    if let Err(e) = self.devices.audio.resume() {
                        self.on_device_failure(Sounding::Audio, e.to_string());
                        return;
                    }
                }
            }
        } else {
            debug!("Loading {} at {:.3}s", src, start);
            if let Err(e) = self.devices.audio.play_clip(src, start) {
                self.on_device_failure(Sounding::Audio, e.to_string());
                return;
            }
            self.audio_src = Some(src.to_string());
            self.last_position = Some(start);
        }

        self.state = PlayerState::Playing(Sounding::Audio);
        self.emit_status(None);
    }

    fn play_without_audio(&mut self, tree: &Arc<TimelineTree>, unit: UnitRef) {
        self.resume_offset_secs = None;
        let (href, fragment) = match tree.text_of(unit.node) {
            Some(text) => (text.src_file.clone(), text.fragment_id.clone()),
            None => (tree.document_href().unwrap_or_default().to_string(), None),
        };

        if let Some(mut handle) = self.devices.content.embedded_media(&href, fragment.as_deref()) {
            self.silence(None);
            self.speech_scope = None;
            debug!("Playing embedded media {}#{:?}", href, fragment);
            match handle.play() {
                Ok(()) => {
                    self.embedded = Some(handle);
                    self.state = PlayerState::Playing(Sounding::Embedded);
                    self.emit_status(None);
                }
                Err(e) => self.on_device_failure(Sounding::Embedded, e.to_string()),
            }
            return;
        }

        let scope = self.policy.granularity_scope(tree, unit.node);
        match self.speech_text(tree, &href, fragment.as_deref(), scope) {
            Some(text) => {
                self.silence(None);
                debug!("Speaking {} characters for {}#{:?}", text.len(), href, fragment);
                if let Err(e) = self
                    .devices
                    .speech
                    .speak(&text, self.settings.rate, self.settings.volume)
                {
                    self.on_device_failure(Sounding::Speech, e.to_string());
                    return;
                }
                self.speech_scope = scope;
                self.state = PlayerState::Playing(Sounding::Speech);
                self.emit_status(None);
            }
            None => {
                self.silence(None);
                self.speech_scope = None;
                warn!("Nothing to play for {}#{:?}, pausing", href, fragment);
                self.state = PlayerState::Paused {
                    sounding: None,
                    intent: ResumeIntent::Continue,
                };
                self.emit_status(Some(format!(
                    "No audio, speech or media for {}#{}",
                    href,
                    fragment.unwrap_or_default()
                )));
            }
        }
    }

    /// Text to synthesize for a unit, or for its whole granularity scope
    fn speech_text(
        &self,
        tree: &TimelineTree,
        href: &str,
        fragment: Option<&str>,
        scope: Option<NodeId>,
    ) -> Option<String> {
        let content = &self.devices.content;
        let text = match scope {
            Some(scope) => match tree.fragment_id(scope) {
                Some(scope_fragment) => content.fragment_text(href, Some(scope_fragment)),
                None => {
                    let parts: Vec<String> = tree
                        .parallels()
                        .iter()
                        .filter(|&&p| tree.contains(scope, p))
                        .filter_map(|&p| tree.text_of(p))
                        .filter_map(|t| content.fragment_text(&t.src_file, t.fragment_id.as_deref()))
                        .collect();
                    (!parts.is_empty()).then(|| parts.join(" "))
                }
            },
            None => content.fragment_text(href, fragment),
        };
        text.filter(|t| !t.trim().is_empty())
    }

    /// Stop sources other than `keep`
    pub(super) fn silence(&mut self, keep: Option<Sounding>) {
        match self.state.sounding() {
            Some(Sounding::Audio) if keep != Some(Sounding::Audio) => self.devices.audio.pause(),
            Some(Sounding::Speech) => self.devices.speech.cancel(),
            _ => {}
        }
        if keep != Some(Sounding::Embedded) {
            if let Some(mut handle) = self.embedded.take() {
                handle.pause();
            }
        }
    }

    // ------------------------------------------------------------------
    // Highlighting
    // ------------------------------------------------------------------

    /// Highlight `unit` unless the same region is already highlighted
    pub(super) fn update_highlight(&mut self, unit: UnitRef) {
        let Some(tree) = self.aggregate.tree(unit.tree).cloned() else {
            return;
        };
        let scope = self.policy.granularity_scope(&tree, unit.node);
        let text = tree.text_of(unit.node);
        let fragment_id = scope
            .and_then(|s| tree.fragment_id(s))
            .or_else(|| text.and_then(|t| t.fragment_id.as_deref()))
            .map(str::to_string);
        let document_href = text
            .map(|t| t.src_file.clone())
            .or_else(|| tree.document_href().map(str::to_string))
            .unwrap_or_default();

        let target = HighlightTarget {
            unit,
            scope,
            document_href,
            fragment_id,
            active_class: self.aggregate.active_class().map(str::to_string),
            playback_active_class: self.aggregate.playback_active_class().map(str::to_string),
        };

        if let Some(previous) = self.highlighted.take() {
            if previous.same_region(&target) {
                self.highlighted = Some(target);
                return;
            }
            self.devices.highlighter.unhighlight(&previous);
        }

        self.devices.highlighter.highlight(&target);
        if self.settings.auto_page_turn {
            self.devices.highlighter.ensure_visible(&target);
        }
        self.events.emit_lossy(SyncEvent::ActiveUnitChanged {
            session_id: self.session_id,
            document_id: tree.document_id().map(str::to_string),
            document_href: target.document_href.clone(),
            fragment_id: target.fragment_id.clone(),
            timestamp: time::now(),
        });
        self.highlighted = Some(target);
    }

    pub(super) fn clear_highlight(&mut self) {
        if let Some(previous) = self.highlighted.take() {
            self.devices.highlighter.unhighlight(&previous);
        }
    }

    // ------------------------------------------------------------------
    // Document loading
    // ------------------------------------------------------------------

    pub(super) fn request_document(&mut self, href: String, anchor: Option<String>, resume: bool) {
        self.silence(None);
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        info!("Requesting document {} ({})", href, ticket);
        self.state = PlayerState::AwaitingDocument {
            ticket,
            href: href.clone(),
            resume,
        };
        self.devices
            .loader
            .load_document(&href, anchor.as_deref(), ticket);
        self.emit_status(None);
    }

    fn on_document_loaded(&mut self, ticket: LoadTicket) {
        let PlayerState::AwaitingDocument {
            ticket: expected,
            href,
            resume,
        } = self.state.clone()
        else {
            debug!("Ignoring {} outside a document load", ticket);
            return;
        };
        if expected != ticket {
            debug!("Ignoring stale {} (waiting for {})", ticket, expected);
            return;
        }

        debug!("Document {} rendered", href);
        self.rendered_href = Some(href);
        if resume {
            self.play_current();
        } else {
            if let Some(unit) = self.cursor.as_ref().and_then(|c| c.unit()) {
                self.update_highlight(unit);
            }
            self.state = PlayerState::Paused {
                sounding: None,
                intent: ResumeIntent::Continue,
            };
            self.emit_status(None);
        }
    }

    fn on_document_load_failed(&mut self, ticket: LoadTicket, reason: String) {
        match &self.state {
            PlayerState::AwaitingDocument {
                ticket: expected,
                href,
                ..
            } if *expected == ticket => {
                error!("Loading {} failed: {}", href, reason);
                let message = format!("Could not load {}: {}", href, reason);
                self.reset_with_diagnostic(message);
            }
            _ => debug!("Ignoring failure of stale {}", ticket),
        }
    }

    // ------------------------------------------------------------------
    // Device failures
    // ------------------------------------------------------------------

    /// Retry the current unit, or give up once the retry limit is spent
    pub(super) fn on_device_failure(&mut self, sounding: Sounding, message: String) {
        self.device_failures += 1;
        if self.device_failures <= self.settings.device_retry_limit {
            warn!(
                "{:?} device failed ({}), retry {}/{}",
                sounding, message, self.device_failures, self.settings.device_retry_limit
            );
            if sounding == Sounding::Audio {
                self.audio_src = None;
            }
            self.play_current();
        } else {
            error!(
                "{:?} device failed {} times, stopping: {}",
                sounding, self.device_failures, message
            );
            self.reset_with_diagnostic(format!("Playback stopped: {}", message));
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn play(&mut self) {
        match self.state.clone() {
            PlayerState::Playing(_) => trace!("Already playing"),
            PlayerState::Paused {
                intent: ResumeIntent::NextChapter,
                ..
            } => {
                info!("Resuming into the next chapter");
                self.advance(Direction::Forward, PositionSource::User);
            }
            PlayerState::Paused {
                sounding: Some(Sounding::Audio),
                ..
            } if self.audio_src.is_some() => match self.devices.audio.resume() {
                Ok(()) => {
                    self.state = PlayerState::Playing(Sounding::Audio);
                    self.emit_status(None);
                }
                Err(e) => self.on_device_failure(Sounding::Audio, e.to_string()),
            },
            PlayerState::Paused {
                sounding: Some(Sounding::Embedded),
                ..
            } if self.embedded.is_some() => {
                let result = match self.embedded.as_mut() {
                    Some(handle) => handle.play(),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => {
                        self.state = PlayerState::Playing(Sounding::Embedded);
                        self.emit_status(None);
                    }
                    Err(e) => self.on_device_failure(Sounding::Embedded, e.to_string()),
                }
            }
            // Speech restarts its utterance; blank pages dwell again
            PlayerState::Paused { .. } => self.play_current(),
            PlayerState::AwaitingDocument { ticket, href, .. } => {
                self.state = PlayerState::AwaitingDocument {
                    ticket,
                    href,
                    resume: true,
                };
                self.emit_status(None);
            }
            PlayerState::Idle => {
                if self.cursor.as_ref().and_then(|c| c.current()).is_some() {
                    self.play_current();
                } else if let Some(first) = self.aggregate.nth_parallel(0) {
                    self.play_parallel(first);
                } else {
                    warn!("Publication has no units to play");
                    self.emit_status(Some("Publication has no narration".to_string()));
                }
            }
        }
    }

    pub fn pause(&mut self) {
        match self.state.clone() {
            PlayerState::Playing(sounding) => {
                match sounding {
                    Sounding::Audio => self.devices.audio.pause(),
                    Sounding::Speech => self.devices.speech.cancel(),
                    Sounding::Embedded => {
                        if let Some(handle) = self.embedded.as_mut() {
                            handle.pause();
                        }
                    }
                    Sounding::BlankPage => {}
                }
                self.generation += 1;
                self.pending_seek = None;
                self.state = PlayerState::Paused {
                    sounding: Some(sounding),
                    intent: ResumeIntent::Continue,
                };
                debug!("Paused {:?}", sounding);
                self.emit_status(None);
            }
            PlayerState::AwaitingDocument {
                ticket,
                href,
                resume: true,
            } => {
                self.state = PlayerState::AwaitingDocument {
                    ticket,
                    href,
                    resume: false,
                };
                self.emit_status(None);
            }
            _ => trace!("Nothing to pause in state {}", self.state),
        }
    }

    pub fn toggle(&mut self) {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop every source, drop the cursor and the highlight
    pub fn reset(&mut self) {
        self.stop_all();
        self.emit_status(None);
    }

    pub(super) fn reset_with_diagnostic(&mut self, diagnostic: String) {
        self.stop_all();
        self.emit_status(Some(diagnostic));
    }

    pub(super) fn stop_all(&mut self) {
        self.generation += 1;
        self.pending_seek = None;
        self.devices.audio.reset();
        self.devices.speech.cancel();
        if let Some(mut handle) = self.embedded.take() {
            handle.pause();
        }
        self.clear_highlight();
        self.cursor = None;
        self.audio_src = None;
        self.last_position = None;
        self.resume_offset_secs = None;
        self.speech_scope = None;
        self.device_failures = 0;
        self.state = PlayerState::Idle;
        debug!("Player reset");
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn set_rate(&mut self, rate: f64) {
        self.settings = PlayerSettings {
            rate,
            ..self.settings.clone()
        }
        .normalized();
        self.devices.audio.set_rate(self.settings.rate);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.settings = PlayerSettings {
            volume,
            ..self.settings.clone()
        }
        .normalized();
        self.devices.audio.set_volume(self.settings.volume);
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.settings.auto_advance = enabled;
    }

    pub fn apply_settings(&mut self, settings: PlayerSettings) {
        self.settings = settings.normalized();
        self.policy = SyncPolicy::new(&self.settings, &self.aggregate);
        self.devices.audio.set_rate(self.settings.rate);
        self.devices.audio.set_volume(self.settings.volume);
        debug!("Settings applied: {:?}", self.policy);
    }

    /// Replace the cursor with one over tree `index`
    pub(super) fn bind_tree(&mut self, index: usize) -> bool {
        if self.cursor.as_ref().map(|c| c.tree_index()) == Some(index) {
            return true;
        }
        let Some(tree) = self.aggregate.tree(index).cloned() else {
            warn!("No timeline {}", index);
            return false;
        };
        self.cursor = Some(TimelineCursor::new(tree.clone(), index));
        self.events.emit_lossy(SyncEvent::ChapterEntered {
            session_id: self.session_id,
            timeline_index: index,
            document_id: tree.document_id().map(str::to_string),
            timestamp: time::now(),
        });
        true
    }
}
