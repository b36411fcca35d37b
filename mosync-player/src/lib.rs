//! # mosync Player Library (mosync-player)
//!
//! Media-overlay synchronization: plays a publication's narration while
//! highlighting the text each clip narrates.
//!
//! **Purpose:** Build read-only timelines from parsed overlay descriptions,
//! walk them in reading order, and keep audio, speech, embedded media and
//! the rendered highlight in step.
//!
//! **Architecture:** Arena timeline trees concatenated into one publication
//! aggregate; a single-owner orchestrator driven by one tokio input channel;
//! hosts plug in through the device traits in [`devices`].

pub mod devices;
pub mod error;
pub mod playback;
pub mod policy;
pub mod sim;
pub mod timeline;

pub use devices::Devices;
pub use error::{Error, Result};
pub use playback::{player_channel, spawn_player, MediaOverlayPlayer, PlayerHandle};
pub use policy::SyncPolicy;
pub use timeline::{TimelineAggregate, TimelineCursor, TimelineTree};
