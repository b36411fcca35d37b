//! Player inputs
//!
//! Device reports and host commands are serialized into one channel and
//! handled one at a time. These types are internal to the engine; what hosts
//! observe is published as `mosync_common::SyncEvent` on the event bus.

use crate::devices::LoadTicket;
use mosync_common::PlayerSettings;
use serde::Serialize;
use tokio::sync::oneshot;

/// Reports from devices and timers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Audio play head position, in seconds into `src`
    ///
    /// Reports for any source other than the one last loaded are dropped.
    AudioPosition { src: String, seconds: f64 },

    AudioPlaying,

    AudioPaused,

    /// Loaded source played to its end
    AudioEnded,

    AudioError { message: String },

    /// Speech reached a word
    ///
    /// # Fields
    /// * `char_index` - Offset of the word in the spoken text
    /// * `char_length` - Length of the word
    SpeechBoundary { char_index: usize, char_length: usize },

    SpeechEnded,

    SpeechError { message: String },

    EmbeddedEnded,

    DocumentLoaded { ticket: LoadTicket },

    DocumentLoadFailed { ticket: LoadTicket, reason: String },

    /// Blank page dwell timer fired
    ///
    /// Carries the operation generation it was armed under; stale timers are
    /// discarded.
    DwellElapsed { generation: u64 },

    /// Time to check whether a seek converged
    SeekCheck { generation: u64 },
}

/// Host requests
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
    Escape,
    Reset,
    PlayDocument { document_id: String },
    PlayFragment { href: String, fragment_id: Option<String> },
    SeekPercent { percent: f64 },
    SetRate { rate: f64 },
    SetVolume { volume: f64 },
    SetAutoAdvance { enabled: bool },
    ApplySettings { settings: Box<PlayerSettings> },
}

/// Where a position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    /// Natural progression reported by a device or timer
    Playback,
    /// Synthesized for a user navigation request
    User,
}

/// Bookmarkable position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub document_id: Option<String>,
    pub document_href: Option<String>,
    pub fragment_id: Option<String>,
    /// Time into the unit's clip
    pub offset_ms: f64,
    /// Publication percentage, when the publication has timed narration
    pub percent: Option<f64>,
    pub is_playing: bool,
}

/// Everything that enters the player task
#[derive(Debug)]
pub enum PlayerInput {
    Command(PlayerCommand),
    Event(PlayerEvent),
    Snapshot(oneshot::Sender<Option<PositionSnapshot>>),
    Shutdown,
}

impl From<PlayerCommand> for PlayerInput {
    fn from(command: PlayerCommand) -> Self {
        PlayerInput::Command(command)
    }
}

impl From<PlayerEvent> for PlayerInput {
    fn from(event: PlayerEvent) -> Self {
        PlayerInput::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_wrap_commands_and_events() {
        match PlayerInput::from(PlayerCommand::SeekPercent { percent: 40.0 }) {
            PlayerInput::Command(PlayerCommand::SeekPercent { percent }) => assert_eq!(percent, 40.0),
            other => panic!("Expected seek command, got {:?}", other),
        }

        match PlayerInput::from(PlayerEvent::DwellElapsed { generation: 3 }) {
            PlayerInput::Event(PlayerEvent::DwellElapsed { generation }) => assert_eq!(generation, 3),
            other => panic!("Expected dwell event, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = PositionSnapshot {
            document_id: Some("c1".to_string()),
            document_href: Some("c1.xhtml".to_string()),
            fragment_id: Some("p2".to_string()),
            offset_ms: 1250.0,
            percent: Some(20.8),
            is_playing: true,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["fragment_id"], "p2");
        assert_eq!(json["offset_ms"], 1250.0);
    }
}
