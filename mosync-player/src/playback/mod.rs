//! Playback orchestration and its async driver

pub mod driver;
pub mod events;
pub mod orchestrator;
pub mod state;

pub use driver::{player_channel, spawn_player, InputSender, PlayerHandle, TokioScheduler};
pub use events::{PlayerCommand, PlayerEvent, PlayerInput, PositionSnapshot, PositionSource};
pub use orchestrator::MediaOverlayPlayer;
pub use state::{PlayerState, ResumeIntent, Sounding};
