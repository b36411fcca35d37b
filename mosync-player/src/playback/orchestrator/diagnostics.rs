//! Status reporting and accessors

use super::MediaOverlayPlayer;
use crate::devices::HighlightTarget;
use crate::playback::events::PositionSnapshot;
use crate::playback::state::PlayerState;
use crate::policy::SyncPolicy;
use crate::timeline::{TimelineAggregate, TimelineTree, UnitRef};
use mosync_common::time::{self, secs_to_ms};
use mosync_common::{PlayerSettings, SyncEvent};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

impl MediaOverlayPlayer {
    /// Publish the current play/pause state
    ///
    /// Every failure path ends here with a diagnostic, so hosts can always
    /// render an accurate play/pause control.
    pub(super) fn emit_status(&self, diagnostic: Option<String>) {
        let event = SyncEvent::PlaybackStatus {
            session_id: self.session_id,
            state: self.state.playback_state(),
            is_playing: self.state.is_playing(),
            sounding: self.state.sounding().map(Into::into),
            diagnostic,
            timestamp: time::now(),
        };
        if self.events.emit(event).is_err() {
            trace!("No status subscribers");
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn aggregate(&self) -> &Arc<TimelineAggregate> {
        &self.aggregate
    }

    pub fn current_unit(&self) -> Option<UnitRef> {
        self.cursor.as_ref().and_then(|c| c.unit())
    }

    pub fn highlighted(&self) -> Option<&HighlightTarget> {
        self.highlighted.as_ref()
    }

    /// Where playback is, for host bookmarking
    pub fn position_snapshot(&self) -> Option<PositionSnapshot> {
        let cursor = self.cursor.as_ref()?;
        let node = cursor.current()?;
        let tree = cursor.tree();
        let text = tree.text_of(node);

        Some(PositionSnapshot {
            document_id: tree.document_id().map(str::to_string),
            document_href: tree
                .document_href()
                .map(str::to_string)
                .or_else(|| text.map(|t| t.src_file.clone())),
            fragment_id: text.and_then(|t| t.fragment_id.clone()),
            offset_ms: self.offset_in_unit_ms(tree, UnitRef {
                tree: cursor.tree_index(),
                node,
            }),
            percent: self.current_percent(),
            is_playing: self.state.is_playing(),
        })
    }

    /// Publication percentage of the current position
    pub fn current_percent(&self) -> Option<f64> {
        if self.aggregate.duration_ms() <= 0.0 {
            return None;
        }
        let cursor = self.cursor.as_ref()?;
        let node = cursor.current()?;
        let tree = cursor.tree();
        let ordinal = tree.ordinal_of(node)?;
        let offset = self.offset_in_unit_ms(tree, UnitRef {
            tree: cursor.tree_index(),
            node,
        });
        self.aggregate
            .position_to_percent(cursor.tree_index(), ordinal, offset)
    }

    /// Time into the current unit's clip
    fn offset_in_unit_ms(&self, tree: &TimelineTree, unit: UnitRef) -> f64 {
        let Some(clip) = tree.audio_of(unit.node) else {
            return 0.0;
        };
        if let Some(offset) = self.resume_offset_secs {
            return secs_to_ms(offset);
        }
        match self.last_position {
            Some(position) if clip.has_source() && clip.src == self.audio_src => {
                let offset = secs_to_ms(position - clip.clip_begin);
                if clip.is_open_ended() {
                    offset.max(0.0)
                } else {
                    offset.clamp(0.0, clip.duration_ms())
                }
            }
            _ => 0.0,
        }
    }
}
