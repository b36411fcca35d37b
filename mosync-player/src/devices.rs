//! Collaborator contracts
//!
//! The orchestrator drives real output only through these traits. Commands go
//! out as method calls; everything a device has to report back (positions,
//! end of clip, errors, finished document loads) comes in as a
//! [`PlayerEvent`] through the player's input channel, one at a time.
//!
//! Implementations for a terminal simulation live in [`crate::sim`].

use crate::error::Result;
use crate::playback::PlayerEvent;
use crate::timeline::{FragmentHierarchy, NodeId, UnitRef};
use std::time::Duration;

/// Narration audio output
///
/// Reports `AudioPosition`, tagged with the source it was measured in,
/// roughly every 20 ms while playing, plus
/// `AudioPlaying`, `AudioPaused`, `AudioEnded` and `AudioError`.
pub trait AudioDevice: Send {
    /// Load `src` and start playing at `start_secs`
    fn play_clip(&mut self, src: &str, start_secs: f64) -> Result<()>;

    /// Move the play head within the loaded source
    ///
    /// Completion is observed through subsequent position reports.
    fn seek(&mut self, position_secs: f64) -> Result<()>;

    fn pause(&mut self);

    fn resume(&mut self) -> Result<()>;

    fn set_rate(&mut self, rate: f64);

    fn set_volume(&mut self, volume: f64);

    /// Stop and unload
    fn reset(&mut self);
}

/// Speech synthesis for units without recorded narration
///
/// Reports `SpeechEnded`, `SpeechError` and optionally `SpeechBoundary`.
/// A cancelled utterance reports nothing further.
pub trait SpeechDevice: Send {
    fn speak(&mut self, text: &str, rate: f64, volume: f64) -> Result<()>;

    fn cancel(&mut self);
}

/// An audio or video element embedded in the document; reports
/// `EmbeddedEnded`
pub trait EmbeddedMediaHandle: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);
}

/// What to highlight for the active unit
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightTarget {
    pub unit: UnitRef,
    /// Granularity container the highlight stands for, if any
    pub scope: Option<NodeId>,
    pub document_href: String,
    /// Fragment to highlight; the scope's text reference when one applies
    pub fragment_id: Option<String>,
    pub active_class: Option<String>,
    pub playback_active_class: Option<String>,
}

impl HighlightTarget {
    /// Two targets covering the same text
    pub fn same_region(&self, other: &HighlightTarget) -> bool {
        self.unit.tree == other.unit.tree
            && self.scope.unwrap_or(self.unit.node) == other.scope.unwrap_or(other.unit.node)
    }
}

/// Text highlighting in the host's rendering
///
/// Commands are idempotent; the orchestrator never reads highlight state back.
pub trait HighlightSink: Send {
    fn highlight(&mut self, target: &HighlightTarget);

    fn unhighlight(&mut self, target: &HighlightTarget);

    fn ensure_visible(&mut self, target: &HighlightTarget);

    /// Word-level highlight inside a spoken unit
    fn highlight_range(&mut self, _target: &HighlightTarget, _char_index: usize, _char_length: usize) {}
}

/// Ticket matching a document load request to its completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(pub u64);

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// Host document navigation
///
/// Answers with `DocumentLoaded { ticket }` or `DocumentLoadFailed`.
pub trait ChapterResolver: Send {
    fn load_document(&mut self, href: &str, anchor: Option<&str>, ticket: LoadTicket);
}

/// Read access to the rendered document
pub trait DocumentContent: FragmentHierarchy + Send {
    /// Text of a fragment (or of the whole document for `None`)
    fn fragment_text(&self, href: &str, fragment_id: Option<&str>) -> Option<String>;

    /// The fragment's element when it is itself playable media
    fn embedded_media(
        &mut self,
        href: &str,
        fragment_id: Option<&str>,
    ) -> Option<Box<dyn EmbeddedMediaHandle>>;
}

/// Delayed self-delivery of an event (blank page dwell, seek checks)
pub trait Scheduler: Send {
    fn schedule(&mut self, delay: Duration, event: PlayerEvent);
}

/// Everything the orchestrator talks to
pub struct Devices {
    pub audio: Box<dyn AudioDevice>,
    pub speech: Box<dyn SpeechDevice>,
    pub highlighter: Box<dyn HighlightSink>,
    pub loader: Box<dyn ChapterResolver>,
    pub content: Box<dyn DocumentContent>,
    pub scheduler: Box<dyn Scheduler>,
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devices").finish_non_exhaustive()
    }
}
