//! Event types for the mosync event system
//!
//! Provides shared event definitions and the EventBus hosts subscribe to.

mod playback_types;

pub use playback_types::{PlaybackState, SoundingKind};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by a media-overlay player
///
/// Every event carries the `session_id` of the player that produced it so a
/// host driving several readers can share one bus.
///
/// Events can be serialized for transmission to a UI process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Play/pause affordance update
    ///
    /// Emitted on every transition and on every failure; hosts can always
    /// render an accurate control from the latest one.
    PlaybackStatus {
        session_id: Uuid,
        /// Coarse state after the transition
        state: PlaybackState,
        /// True while something is sounding
        is_playing: bool,
        /// Source kind when playing
        sounding: Option<SoundingKind>,
        /// Human-readable reason for stops caused by failures
        diagnostic: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Highlighted fragment changed
    ActiveUnitChanged {
        session_id: Uuid,
        /// Manifest id of the owning document (None for blank pages)
        document_id: Option<String>,
        /// Document the fragment lives in
        document_href: String,
        /// Fragment id within the document (None means the whole document)
        fragment_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cursor moved into another chapter's timeline
    ChapterEntered {
        session_id: Uuid,
        /// Index of the timeline within the publication
        timeline_index: usize,
        document_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Forward playback ran off the last timeline
    PublicationEnded {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Session that produced the event
    pub fn session_id(&self) -> Uuid {
        match self {
            SyncEvent::PlaybackStatus { session_id, .. }
            | SyncEvent::ActiveUnitChanged { session_id, .. }
            | SyncEvent::ChapterEntered { session_id, .. }
            | SyncEvent::PublicationEnded { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the player)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use mosync_common::events::{EventBus, PlaybackState, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::PlaybackStatus {
///     session_id: uuid::Uuid::nil(),
///     state: PlaybackState::Paused,
///     is_playing: false,
///     sounding: None,
///     diagnostic: None,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
