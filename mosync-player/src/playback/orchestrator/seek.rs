//! Seek convergence
//!
//! Audio devices do not always land where asked. A seek is re-issued on a
//! timer until a reported position is within the threshold of the target,
//! up to `seek.max_attempts` times; after that the source is reloaded at the
//! target instead. Every check carries the generation it was scheduled
//! under, so a seek superseded by pause, reset or a new unit dies quietly.

use super::MediaOverlayPlayer;
use crate::playback::events::PlayerEvent;
use crate::playback::state::Sounding;
use mosync_common::time::millis_to_duration;
use tracing::{debug, trace, warn};

/// Seek in flight
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingSeek {
    pub(crate) target_secs: f64,
    pub(crate) attempts: u32,
}

impl MediaOverlayPlayer {
    pub(super) fn begin_seek(&mut self, target_secs: f64) {
        self.pending_seek = Some(PendingSeek {
            target_secs,
            attempts: 0,
        });
        self.attempt_seek();
    }

    fn attempt_seek(&mut self) {
        let Some(seek) = self.pending_seek.as_mut() else {
            return;
        };
        seek.attempts += 1;
        let (target, attempt) = (seek.target_secs, seek.attempts);
        debug!(
            "Seeking to {:.3}s (attempt {}/{})",
            target, attempt, self.settings.seek.max_attempts
        );

        if let Err(e) = self.devices.audio.seek(target) {
            warn!("Seek to {:.3}s failed: {}", target, e);
        }
        self.devices.scheduler.schedule(
            millis_to_duration(self.settings.seek.retry_delay_ms),
            PlayerEvent::SeekCheck {
                generation: self.generation,
            },
        );
    }

    fn converged(&self, position: f64) -> bool {
        self.pending_seek
            .as_ref()
            .map(|seek| (position - seek.target_secs).abs() < self.settings.seek.threshold_secs)
            .unwrap_or(false)
    }

    /// Position report while a seek is in flight
    pub(super) fn observe_seek_position(&mut self, seconds: f64) {
        if self.converged(seconds) {
            debug!("Seek converged at {:.3}s", seconds);
            self.pending_seek = None;
        } else {
            trace!("Position {:.3}s while seeking", seconds);
        }
    }

    pub(super) fn on_seek_check(&mut self, generation: u64) {
        if generation != self.generation {
            trace!("Discarding stale seek check (generation {})", generation);
            return;
        }
        let Some(seek) = self.pending_seek.clone() else {
            return;
        };
        if self.last_position.map(|p| self.converged(p)).unwrap_or(false) {
            debug!("Seek to {:.3}s converged", seek.target_secs);
            self.pending_seek = None;
            return;
        }
        if seek.attempts < self.settings.seek.max_attempts {
            self.attempt_seek();
            return;
        }

        warn!(
            "Seek to {:.3}s did not converge after {} attempts (last position {:?}), reloading source",
            seek.target_secs, seek.attempts, self.last_position
        );
        self.pending_seek = None;
        let Some(src) = self.audio_src.clone() else {
            return;
        };
        self.devices.audio.reset();
        match self.devices.audio.play_clip(&src, seek.target_secs) {
            Ok(()) => self.last_position = Some(seek.target_secs),
            Err(e) => self.on_device_failure(Sounding::Audio, e.to_string()),
        }
    }
}
