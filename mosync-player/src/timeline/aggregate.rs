//! Whole-publication timeline
//!
//! Concatenates one [`TimelineTree`] per document, in reading order, into a
//! single logical duration. Global time is the sum of preceding trees'
//! durations plus the time within the owning tree.

use super::dto::PublicationDto;
use super::node::NodeId;
use super::tree::TimelineTree;
use crate::error::Result;
use mosync_common::time::ms_to_secs;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A unit addressed across the whole publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitRef {
    /// Index of the owning tree
    pub tree: usize,
    pub node: NodeId,
}

/// Result of a percent lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatePosition {
    pub tree: usize,
    pub parallel: NodeId,
    /// Ordinal of `parallel` within its tree
    pub ordinal: usize,
    /// Time into the unit's clip
    pub offset_ms: f64,
}

impl AggregatePosition {
    pub fn unit(&self) -> UnitRef {
        UnitRef {
            tree: self.tree,
            node: self.parallel,
        }
    }
}

/// All documents' timelines plus publication-wide metadata
#[derive(Debug, Clone, Default)]
pub struct TimelineAggregate {
    trees: Vec<Arc<TimelineTree>>,
    skippables: Vec<String>,
    escapables: Vec<String>,
    narrator: Option<String>,
    active_class: Option<String>,
    playback_active_class: Option<String>,
}

impl TimelineAggregate {
    /// Aggregate over already-built trees, without publication metadata
    pub fn new(trees: Vec<TimelineTree>) -> Self {
        Self {
            trees: trees.into_iter().map(Arc::new).collect(),
            ..Default::default()
        }
    }

    /// Build every document's tree
    ///
    /// A timeline that cannot be built at all is replaced by a blank page for
    /// its document (or dropped when it has no href), so one broken chapter
    /// never takes the publication down.
    pub fn from_dto(dto: &PublicationDto) -> Result<Self> {
        let manifest: HashMap<String, String> = dto
            .manifest
            .iter()
            .map(|item| (item.href.clone(), item.id.clone()))
            .collect();

        let mut trees = Vec::with_capacity(dto.timelines.len());
        for (i, timeline) in dto.timelines.iter().enumerate() {
            match TimelineTree::build(timeline, &manifest) {
                Ok(tree) => trees.push(Arc::new(tree)),
                Err(e) => match timeline.document_href.as_deref() {
                    Some(href) => {
                        warn!("Timeline {} ({}) unusable, playing as blank page: {}", i, href, e);
                        trees.push(Arc::new(TimelineTree::blank_page(href)));
                    }
                    None => warn!("Timeline {} unusable and has no href, dropped: {}", i, e),
                },
            }
        }

        let aggregate = Self {
            trees,
            skippables: dto.skippables.clone(),
            escapables: dto.escapables.clone(),
            narrator: dto.narrator.clone(),
            active_class: dto.active_class.clone(),
            playback_active_class: dto.playback_active_class.clone(),
        };
        info!(
            "Loaded publication timeline: {} documents, {:.1}s of narration",
            aggregate.len(),
            ms_to_secs(aggregate.duration_ms())
        );
        Ok(aggregate)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let dto: PublicationDto = serde_json::from_str(json)?;
        Self::from_dto(&dto)
    }

    /// Load a JSON publication timeline from disk
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading publication timeline from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn trees(&self) -> &[Arc<TimelineTree>] {
        &self.trees
    }

    pub fn tree(&self, index: usize) -> Option<&Arc<TimelineTree>> {
        self.trees.get(index)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Publication default skippable epubTypes
    pub fn skippables(&self) -> &[String] {
        &self.skippables
    }

    /// Publication default escapable epubTypes
    pub fn escapables(&self) -> &[String] {
        &self.escapables
    }

    pub fn narrator(&self) -> Option<&str> {
        self.narrator.as_deref()
    }

    pub fn active_class(&self) -> Option<&str> {
        self.active_class.as_deref()
    }

    pub fn playback_active_class(&self) -> Option<&str> {
        self.playback_active_class.as_deref()
    }

    // ------------------------------------------------------------------
    // Time queries
    // ------------------------------------------------------------------

    pub fn duration_ms(&self) -> f64 {
        self.trees.iter().map(|t| t.duration_ms()).sum()
    }

    /// Global time at which tree `index` starts
    fn tree_start_ms(&self, index: usize) -> f64 {
        self.trees[..index.min(self.trees.len())]
            .iter()
            .map(|t| t.duration_ms())
            .sum()
    }

    /// Unit sounding at global `time_ms`; same closed-end convention as
    /// [`TimelineTree::parallel_at`]
    pub fn parallel_at(&self, time_ms: f64) -> Option<UnitRef> {
        if !(time_ms >= 0.0) {
            return None;
        }
        let mut remaining = time_ms;
        for (index, tree) in self.trees.iter().enumerate() {
            let duration = tree.duration_ms();
            if duration > 0.0 && remaining <= duration {
                return tree
                    .parallel_at(remaining)
                    .map(|node| UnitRef { tree: index, node });
            }
            remaining -= duration;
        }
        None
    }

    /// The `n`-th unit of the publication, counting across documents
    pub fn nth_parallel(&self, n: usize) -> Option<UnitRef> {
        let mut remaining = n;
        for (index, tree) in self.trees.iter().enumerate() {
            let count = tree.parallels().len();
            if remaining < count {
                return tree
                    .nth_parallel(remaining)
                    .map(|node| UnitRef { tree: index, node });
            }
            remaining -= count;
        }
        None
    }

    /// Global time at which `unit` starts
    pub fn clip_offset(&self, unit: UnitRef) -> Option<f64> {
        let tree = self.trees.get(unit.tree)?;
        let local = tree.clip_offset(unit.node)?;
        Some(self.tree_start_ms(unit.tree) + local)
    }

    /// Resolve a publication percentage to a unit and an offset into it
    ///
    /// `percent` is clamped to `[0, 100]` (NaN counts as 0). A publication
    /// without timed narration resolves every percentage to its first unit.
    pub fn percent_to_position(&self, percent: f64) -> Option<AggregatePosition> {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        let total = self.duration_ms();
        if total <= 0.0 {
            let unit = self.nth_parallel(0)?;
            return Some(AggregatePosition {
                tree: unit.tree,
                parallel: unit.node,
                ordinal: 0,
                offset_ms: 0.0,
            });
        }

        let time_ms = total * percent / 100.0;
        let unit = self.parallel_at(time_ms)?;
        let tree = &self.trees[unit.tree];
        let start = self.clip_offset(unit)?;
        let clip_ms = tree.duration_ms_of(unit.node);

        Some(AggregatePosition {
            tree: unit.tree,
            parallel: unit.node,
            ordinal: tree.ordinal_of(unit.node)?,
            offset_ms: (time_ms - start).clamp(0.0, clip_ms),
        })
    }

    /// Inverse of [`percent_to_position`](Self::percent_to_position)
    ///
    /// `None` when the tree index is out of range or the ordinal names no
    /// unit.
    pub fn position_to_percent(
        &self,
        tree_index: usize,
        ordinal: usize,
        offset_ms: f64,
    ) -> Option<f64> {
        let tree = self.trees.get(tree_index)?;
        let node = tree.nth_parallel(ordinal)?;
        let total = self.duration_ms();
        if total <= 0.0 {
            return Some(0.0);
        }
        let start = self.clip_offset(UnitRef {
            tree: tree_index,
            node,
        })?;
        let offset = offset_ms.clamp(0.0, tree.duration_ms_of(node));
        Some(((start + offset) / total * 100.0).clamp(0.0, 100.0))
    }

    // ------------------------------------------------------------------
    // Document navigation
    // ------------------------------------------------------------------

    pub fn next_tree(&self, current: usize) -> Option<usize> {
        let next = current.checked_add(1)?;
        (next < self.trees.len()).then_some(next)
    }

    pub fn previous_tree(&self, current: usize) -> Option<usize> {
        current
            .checked_sub(1)
            .filter(|&i| i < self.trees.len())
    }

    /// Tree of the document with id `document_id`
    ///
    /// When the caller also knows the document's href, a tree whose href
    /// disagrees is reported but still returned; an unknown id falls back to
    /// the href.
    pub fn tree_for_document(&self, document_id: &str, href: Option<&str>) -> Option<usize> {
        let by_id = self
            .trees
            .iter()
            .position(|t| t.document_id() == Some(document_id));

        match (by_id, href) {
            (Some(index), Some(href)) => {
                let tree_href = self.trees[index].document_href();
                if tree_href.is_some() && tree_href != Some(href) {
                    warn!(
                        "Document {} resolved to {:?} but {} was requested",
                        document_id, tree_href, href
                    );
                }
                Some(index)
            }
            (Some(index), None) => Some(index),
            (None, Some(href)) => {
                warn!("Unknown document id {}, falling back to href {}", document_id, href);
                self.tree_for_href(href)
            }
            (None, None) => {
                warn!("Unknown document id {}", document_id);
                None
            }
        }
    }

    pub fn tree_for_href(&self, href: &str) -> Option<usize> {
        self.trees
            .iter()
            .position(|t| t.document_href() == Some(href))
    }
}
