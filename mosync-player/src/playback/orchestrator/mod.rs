//! Playback orchestrator
//!
//! **Module Structure:**
//! - `core.rs`: Construction, rendering the current unit, lifecycle, dispatch
//! - `navigation.rs`: Position re-synchronization, the step loop, user navigation
//! - `seek.rs`: Seek retry and convergence
//! - `diagnostics.rs`: Status events, snapshots, accessors

mod core;
mod diagnostics;
mod navigation;
mod seek;

pub use self::core::MediaOverlayPlayer;
