//! Playback-related type definitions
//!
//! Supporting types carried by playback status events.

use serde::{Deserialize, Serialize};

/// Coarse playback state reported to hosts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Something is sounding (audio, speech, embedded media or a blank-page dwell)
    Playing,
    /// Suspended with the cursor position retained
    Paused,
    /// Nothing bound; the cursor was discarded
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// What kind of source is producing sound for the active unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SoundingKind {
    /// Pre-recorded narration clip
    Audio,
    /// Synthesized speech of the unit's text
    Speech,
    /// Audio/video element embedded in the document itself
    EmbeddedMedia,
    /// Silent dwell on a document without narration
    BlankPage,
}

impl std::fmt::Display for SoundingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundingKind::Audio => write!(f, "audio"),
            SoundingKind::Speech => write!(f, "speech"),
            SoundingKind::EmbeddedMedia => write!(f, "embedded_media"),
            SoundingKind::BlankPage => write!(f, "blank_page"),
        }
    }
}
