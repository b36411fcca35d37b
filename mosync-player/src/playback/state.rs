//! Orchestrator state
//!
//! One tagged state instead of a set of flags: what is sounding, and, while
//! paused, what resuming should do.

use crate::devices::LoadTicket;
use mosync_common::events::{PlaybackState, SoundingKind};

/// What is producing output for the current unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sounding {
    Audio,
    Speech,
    Embedded,
    BlankPage,
}

impl From<Sounding> for SoundingKind {
    fn from(sounding: Sounding) -> Self {
        match sounding {
            Sounding::Audio => SoundingKind::Audio,
            Sounding::Speech => SoundingKind::Speech,
            Sounding::Embedded => SoundingKind::EmbeddedMedia,
            Sounding::BlankPage => SoundingKind::BlankPage,
        }
    }
}

/// What an explicit resume does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeIntent {
    /// Pick up where playback stopped
    Continue,
    /// The chapter finished with auto-advance off: move on to the next one
    NextChapter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    Idle,
    Playing(Sounding),
    Paused {
        /// Source that was sounding, if it can be resumed in place
        sounding: Option<Sounding>,
        intent: ResumeIntent,
    },
    /// Waiting for the host to render the document of the current unit
    AwaitingDocument {
        ticket: LoadTicket,
        href: String,
        /// Start playing once loaded
        resume: bool,
    },
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        match self {
            PlayerState::Playing(_) => true,
            PlayerState::AwaitingDocument { resume, .. } => *resume,
            PlayerState::Idle | PlayerState::Paused { .. } => false,
        }
    }

    pub fn sounding(&self) -> Option<Sounding> {
        match self {
            PlayerState::Playing(sounding) => Some(*sounding),
            _ => None,
        }
    }

    /// Host-facing summary
    pub fn playback_state(&self) -> PlaybackState {
        match self {
            PlayerState::Idle => PlaybackState::Stopped,
            PlayerState::Paused { .. } => PlaybackState::Paused,
            PlayerState::Playing(_) => PlaybackState::Playing,
            PlayerState::AwaitingDocument { resume: true, .. } => PlaybackState::Playing,
            PlayerState::AwaitingDocument { resume: false, .. } => PlaybackState::Paused,
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Playing(sounding) => write!(f, "playing {:?}", sounding),
            PlayerState::Paused { intent, .. } => write!(f, "paused ({:?})", intent),
            PlayerState::AwaitingDocument { href, ticket, .. } => {
                write!(f, "awaiting {} ({})", href, ticket)
            }
        }
    }
}
