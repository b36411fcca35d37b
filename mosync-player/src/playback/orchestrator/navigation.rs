//! Moving through the publication
//!
//! **Responsibilities:**
//! - Position re-synchronization (`on_position`)
//! - The step loop shared by natural progression and user navigation:
//!   skipping, granularity coalescing and chapter crossing
//! - Escape, next/previous, and jumps to a unit, document, fragment or
//!   percentage

use super::MediaOverlayPlayer;
use crate::playback::events::PositionSource;
use crate::playback::state::{PlayerState, ResumeIntent, Sounding};
use crate::timeline::{Direction, NodeId, TimelineCursor, UnitRef};
use mosync_common::time::{self, ms_to_secs};
use mosync_common::SyncEvent;
use tracing::{debug, info, trace, warn};

/// How far past a clip boundary a synthesized navigation position lands
const NAVIGATION_NUDGE_SECS: f64 = 0.1;

/// First movement of a step
#[derive(Debug, Clone, Copy)]
enum Move {
    Step(Direction),
    /// Leave a whole subtree (escape)
    SkipPast(NodeId),
}

impl Move {
    fn direction(self) -> Direction {
        match self {
            Move::Step(direction) => direction,
            Move::SkipPast(_) => Direction::Forward,
        }
    }
}

/// Where a step ended up
#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolved {
    Unit(UnitRef),
    /// Chapter finished with auto-advance off
    Held,
    /// Ran off the end of the publication
    Ended,
}

impl MediaOverlayPlayer {
    /// Start playback at `unit`
    pub fn play_parallel(&mut self, unit: UnitRef) {
        if !self.bind_tree(unit.tree) {
            self.emit_status(Some(format!("No timeline {}", unit.tree)));
            return;
        }
        let moved = self
            .cursor
            .as_mut()
            .map(|cursor| cursor.go_to(unit.node))
            .unwrap_or(false);
        if !moved {
            self.emit_status(Some(format!("Unit {} is not part of timeline {}", unit.node, unit.tree)));
            return;
        }
        self.device_failures = 0;
        self.play_current();
    }

    /// Play a document from its first unit
    pub fn play_document(&mut self, document_id: &str) {
        let Some(index) = self.aggregate.tree_for_document(document_id, None) else {
            self.emit_status(Some(format!("Unknown document {}", document_id)));
            return;
        };
        match self.aggregate.tree(index).and_then(|t| t.nth_parallel(0)) {
            Some(node) => {
                info!("Playing document {} (timeline {})", document_id, index);
                self.play_parallel(UnitRef { tree: index, node });
            }
            None => {
                warn!("Document {} has no units", document_id);
                self.emit_status(Some(format!("Document {} has no narration", document_id)));
            }
        }
    }

    /// Play from a fragment the user picked in the rendered document
    ///
    /// Falls back to the document's first unit when the fragment is not
    /// narrated.
    pub fn play_fragment(&mut self, href: &str, fragment_id: Option<&str>) {
        let Some(index) = self.aggregate.tree_for_href(href) else {
            warn!("No timeline narrates {}", href);
            self.emit_status(Some(format!("No narration for {}", href)));
            return;
        };
        let Some(tree) = self.aggregate.tree(index).cloned() else {
            return;
        };

        let mut cursor = TimelineCursor::new(tree, index);
        if let Some(id) = fragment_id {
            if !cursor.find_by_fragment_id_in(id, self.devices.content.as_ref()) {
                debug!("Fragment {} of {} is not narrated, starting from the top", id, href);
            }
        }
        let Some(node) = cursor.current() else {
            self.emit_status(Some(format!("Document {} has no narration", href)));
            return;
        };

        // The host is showing the document the user clicked in
        self.rendered_href = Some(href.to_string());
        if !self.bind_tree(index) {
            return;
        }
        if let Some(bound) = self.cursor.as_mut() {
            bound.go_to(node);
        }
        self.device_failures = 0;
        self.play_current();
    }

    /// Jump to a publication percentage
    ///
    /// While paused the new position is only highlighted; playback resumes
    /// from it on the next `play`.
    pub fn seek_percent(&mut self, percent: f64) {
        let Some(position) = self.aggregate.percent_to_position(percent) else {
            self.emit_status(Some("Publication has no narration".to_string()));
            return;
        };
        debug!(
            "Seek to {:.1}% -> timeline {} unit {} +{:.0} ms",
            percent, position.tree, position.ordinal, position.offset_ms
        );

        let was_playing = self.state.is_playing();
        if !self.bind_tree(position.tree) {
            return;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.go_to(position.parallel);
        }
        self.resume_offset_secs = Some(ms_to_secs(position.offset_ms));

        if was_playing {
            self.play_current();
            return;
        }

        self.generation += 1;
        self.pending_seek = None;
        let href = self
            .aggregate
            .tree(position.tree)
            .and_then(|t| t.document_href())
            .map(str::to_string);
        match href {
            Some(href) if self.rendered_href.as_deref() != Some(href.as_str()) => {
                let anchor = self
                    .aggregate
                    .tree(position.tree)
                    .and_then(|t| t.text_of(position.parallel))
                    .and_then(|t| t.fragment_id.clone());
                self.request_document(href, anchor, false);
            }
            _ => {
                self.silence(None);
                self.update_highlight(position.unit());
                self.state = PlayerState::Paused {
                    sounding: None,
                    intent: ResumeIntent::Continue,
                };
                self.emit_status(None);
            }
        }
    }

    // ------------------------------------------------------------------
    // Position re-synchronization
    // ------------------------------------------------------------------

    /// Audio position report
    pub(super) fn on_audio_position(&mut self, src: &str, seconds: f64) {
        if self.state != PlayerState::Playing(Sounding::Audio) {
            trace!("Ignoring audio position {:.3}s in state {}", seconds, self.state);
            return;
        }
        if self.audio_src.as_deref() != Some(src) {
            trace!(
                "Discarding late position {:.3}s from {} (loaded: {:?})",
                seconds,
                src,
                self.audio_src
            );
            return;
        }
        self.last_position = Some(seconds);
        if self.pending_seek.is_some() {
            self.observe_seek_position(seconds);
            return;
        }
        self.on_position(seconds, PositionSource::Playback);
    }

    /// Re-synchronize the cursor with a position inside the current source
    ///
    /// Positions inside the current clip are a no-op. Past the end the cursor
    /// moves forward, before the start (less the tolerance) it moves back.
    pub fn on_position(&mut self, seconds: f64, source: PositionSource) {
        let Some(cursor) = &self.cursor else {
            return;
        };
        let Some(node) = cursor.current() else {
            return;
        };
        let Some(clip) = cursor.tree().audio_of(node) else {
            return;
        };
        if clip.contains(seconds, self.settings.position_tolerance_secs) {
            trace!("{:.3}s inside [{:.3}, {:.3}]", seconds, clip.clip_begin, clip.clip_end);
            return;
        }

        let direction = if seconds > clip.clip_end {
            Direction::Forward
        } else {
            Direction::Backward
        };
        debug!(
            "{:.3}s left clip [{:.3}, {:.3}], moving {:?}",
            seconds, clip.clip_begin, clip.clip_end, direction
        );
        self.advance(direction, source);
    }

    /// Move one unit in `direction`, then render the result
    pub(super) fn advance(&mut self, direction: Direction, source: PositionSource) {
        self.advance_by(Move::Step(direction), source);
    }

    fn advance_by(&mut self, first: Move, source: PositionSource) {
        let Some(origin) = self.cursor.as_ref().and_then(|c| c.unit()) else {
            debug!("No current unit to move from");
            return;
        };
        let direction = first.direction();

        match self.resolve(first, source) {
            Resolved::Unit(unit) => self.land(unit, direction),
            Resolved::Held => {
                info!("End of timeline {} with auto-advance off, holding", origin.tree);
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.go_to(origin.node);
                }
                self.generation += 1;
                self.pending_seek = None;
                self.silence(None);
                self.speech_scope = None;
                self.state = PlayerState::Paused {
                    sounding: None,
                    intent: ResumeIntent::NextChapter,
                };
                self.emit_status(None);
            }
            Resolved::Ended => {
                info!("Publication ended");
                self.stop_all();
                self.events.emit_lossy(SyncEvent::PublicationEnded {
                    session_id: self.session_id,
                    timestamp: time::now(),
                });
                self.emit_status(None);
            }
        }
    }

    /// The step loop
    ///
    /// Skippable units and units inside the scope being spoken are passed
    /// over in the same direction. Running off a tree continues in the
    /// neighbouring one, unless a finished chapter must be held.
    fn resolve(&mut self, first: Move, source: PositionSource) -> Resolved {
        let direction = first.direction();
        let hold_at_chapter_end =
            direction.is_forward() && !self.settings.auto_advance && source == PositionSource::Playback;
        let coalesce = match (self.state.sounding(), self.speech_scope, &self.cursor) {
            (Some(Sounding::Speech), Some(scope), Some(cursor)) => Some((cursor.tree_index(), scope)),
            _ => None,
        };

        let mut candidate = match (self.cursor.as_mut(), first) {
            (Some(cursor), Move::Step(direction)) => cursor.step(direction),
            (Some(cursor), Move::SkipPast(node)) => cursor.skip_past(node),
            (None, _) => return Resolved::Ended,
        };

        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                return Resolved::Ended;
            };
            let tree = cursor.tree().clone();
            let tree_index = cursor.tree_index();

            match candidate {
                Some(node) => {
                    if self.policy.skips(&tree, node) {
                        debug!("Skipping unit {} of timeline {}", node, tree_index);
                        candidate = cursor.step(direction);
                        continue;
                    }
                    if let Some((scope_tree, scope)) = coalesce {
                        if scope_tree == tree_index && tree.contains(scope, node) {
                            trace!("Unit {} already spoken with scope {}", node, scope);
                            candidate = cursor.step(direction);
                            continue;
                        }
                    }
                    return Resolved::Unit(UnitRef {
                        tree: tree_index,
                        node,
                    });
                }
                None => {
                    let neighbour = match direction {
                        Direction::Forward => self.aggregate.next_tree(tree_index),
                        Direction::Backward => self.aggregate.previous_tree(tree_index),
                    };
                    let Some(next_tree) = neighbour else {
                        if direction.is_forward() {
                            return Resolved::Ended;
                        }
                        // Stepping back from the very first unit replays it
                        return match cursor.reset() {
                            Some(node) => Resolved::Unit(UnitRef {
                                tree: tree_index,
                                node,
                            }),
                            None => Resolved::Ended,
                        };
                    };
                    if hold_at_chapter_end {
                        return Resolved::Held;
                    }
                    self.enter_tree(next_tree, direction);
                    candidate = self.cursor.as_ref().and_then(|c| c.current());
                }
            }
        }
    }

    /// Bind the neighbouring tree, positioned at its near end
    fn enter_tree(&mut self, index: usize, direction: Direction) {
        if !self.bind_tree(index) {
            return;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            if !direction.is_forward() {
                cursor.last();
            }
            info!(
                "Entered timeline {} ({})",
                index,
                cursor.tree().document_href().unwrap_or("no href")
            );
        }
    }

    /// Render a resolved unit
    ///
    /// Audio that is already sounding inside the new unit's clip keeps
    /// playing; only the highlight moves.
    fn land(&mut self, unit: UnitRef, direction: Direction) {
        let unit = if direction.is_forward() {
            unit
        } else {
            self.scope_start(unit).unwrap_or(unit)
        };
        self.device_failures = 0;

        if self.continues_audio(unit) {
            trace!("Audio continues into unit {}", unit.node);
            self.update_highlight(unit);
            return;
        }
        self.play_current();
    }

    /// Start of the granularity scope a spoken unit belongs to
    fn scope_start(&mut self, unit: UnitRef) -> Option<UnitRef> {
        let tree = self.aggregate.tree(unit.tree)?.clone();
        if tree.audio_of(unit.node).map(|c| c.has_source()).unwrap_or(false) {
            return None;
        }
        let scope = self.policy.granularity_scope(&tree, unit.node)?;
        let first = tree
            .parallels()
            .iter()
            .copied()
            .find(|&p| tree.contains(scope, p))?;
        if first == unit.node {
            return None;
        }

        let cursor = self.cursor.as_mut()?;
        if cursor.tree_index() == unit.tree && cursor.go_to(first) {
            Some(UnitRef {
                tree: unit.tree,
                node: first,
            })
        } else {
            warn!(
                "Could not re-enter scope {} at unit {}, staying on {}",
                scope, first, unit.node
            );
            None
        }
    }

    fn continues_audio(&self, unit: UnitRef) -> bool {
        if self.state != PlayerState::Playing(Sounding::Audio) || self.pending_seek.is_some() {
            return false;
        }
        let Some(tree) = self.aggregate.tree(unit.tree) else {
            return false;
        };
        if tree.document_href().is_some() && tree.document_href() != self.rendered_href.as_deref() {
            return false;
        }
        let (Some(clip), Some(position)) = (tree.audio_of(unit.node), self.last_position) else {
            return false;
        };
        clip.src.is_some()
            && clip.src == self.audio_src
            && clip.contains(position, self.settings.position_tolerance_secs)
    }

    // ------------------------------------------------------------------
    // User navigation
    // ------------------------------------------------------------------

    /// Leave the escapable structure around the current unit
    ///
    /// Falls back to [`next_overlay`](Self::next_overlay) outside escapable
    /// structures; resumes when nothing is playing.
    pub fn escape(&mut self) {
        if !self.state.is_playing() {
            self.play();
            return;
        }
        let scope = self.cursor.as_ref().and_then(|cursor| {
            cursor
                .current()
                .and_then(|node| self.policy.escape_scope(cursor.tree(), node))
        });
        match scope {
            Some(scope) => {
                info!("Escaping structure {}", scope);
                self.advance_by(Move::SkipPast(scope), PositionSource::User);
            }
            None => self.next_overlay(),
        }
    }

    pub fn next_overlay(&mut self) {
        self.navigate(Direction::Forward);
    }

    pub fn previous_overlay(&mut self) {
        self.navigate(Direction::Backward);
    }

    /// Resume when not playing; otherwise synthesize a position just outside
    /// the current clip
    fn navigate(&mut self, direction: Direction) {
        if !self.state.is_playing() {
            self.play();
            return;
        }
        if matches!(self.state, PlayerState::AwaitingDocument { .. }) {
            debug!("Navigation ignored while a document loads");
            return;
        }

        let clip = self
            .cursor
            .as_ref()
            .and_then(|c| c.current().and_then(|node| c.tree().audio_of(node).cloned()));
        match clip {
            Some(clip)
                if self.state == PlayerState::Playing(Sounding::Audio)
                    && !clip.is_open_ended() =>
            {
                let position = match direction {
                    Direction::Forward => clip.clip_end + NAVIGATION_NUDGE_SECS,
                    Direction::Backward => {
                        clip.clip_begin - self.settings.position_tolerance_secs - NAVIGATION_NUDGE_SECS
                    }
                };
                self.on_position(position, PositionSource::User);
            }
            _ => self.advance(direction, PositionSource::User),
        }
    }
}
