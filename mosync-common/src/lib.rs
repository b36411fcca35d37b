//! # mosync Common Library
//!
//! Shared code for the media-overlay synchronization crates:
//! - Error type
//! - Event types (SyncEvent enum) and the EventBus
//! - Settings loading and config file resolution
//! - Clock-value parsing and time conversions

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use config::PlayerSettings;
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
