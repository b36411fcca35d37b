//! Skip, escape and granularity rules
//!
//! All three are epubType membership checks against a unit and its
//! ancestors. The free functions are pure; [`SyncPolicy`] binds them to the
//! user's settings and the publication defaults.

use crate::timeline::{NodeId, TimelineAggregate, TimelineTree};
use mosync_common::PlayerSettings;

/// Whether `unit` or one of its ancestors carries one of `types`
pub fn is_skippable(tree: &TimelineTree, unit: NodeId, types: &[String]) -> bool {
    types
        .iter()
        .any(|ty| tree.first_ancestor_with_type(unit, ty, true).is_some())
}

/// Innermost container (possibly `unit` itself) tagged with one of `types`
///
/// Escaping jumps to the first unit after this container.
pub fn escapable_scope(tree: &TimelineTree, unit: NodeId, types: &[String]) -> Option<NodeId> {
    std::iter::once(unit)
        .chain(tree.ancestors(unit))
        .find(|&node| types.iter().any(|ty| tree.node(node).has_epub_type(ty)))
}

pub fn is_escapable(tree: &TimelineTree, unit: NodeId, types: &[String]) -> bool {
    escapable_scope(tree, unit, types).is_some()
}

/// Innermost ancestor sequence of `unit` tagged `granularity`
pub fn granularity_scope(tree: &TimelineTree, unit: NodeId, granularity: &str) -> Option<NodeId> {
    tree.ancestors(unit)
        .find(|&node| tree.node(node).is_sequence() && tree.node(node).has_epub_type(granularity))
}

/// Settings-bound policy used by the orchestrator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPolicy {
    pub enable_skip: bool,
    pub skippables: Vec<String>,
    pub enable_escape: bool,
    pub escapables: Vec<String>,
    pub granularity: Option<String>,
}

impl SyncPolicy {
    /// Publication defaults plus the user's own lists
    pub fn new(settings: &PlayerSettings, aggregate: &TimelineAggregate) -> Self {
        Self {
            enable_skip: settings.enable_skip,
            skippables: union(aggregate.skippables(), &settings.skippables),
            enable_escape: settings.enable_escape,
            escapables: union(aggregate.escapables(), &settings.escapables),
            granularity: settings
                .granularity
                .clone()
                .filter(|g| !g.trim().is_empty()),
        }
    }

    pub fn skips(&self, tree: &TimelineTree, unit: NodeId) -> bool {
        self.enable_skip && is_skippable(tree, unit, &self.skippables)
    }

    /// Container an escape from `unit` leaves, if escaping applies
    pub fn escape_scope(&self, tree: &TimelineTree, unit: NodeId) -> Option<NodeId> {
        if !self.enable_escape {
            return None;
        }
        escapable_scope(tree, unit, &self.escapables)
    }

    pub fn granularity_scope(&self, tree: &TimelineTree, unit: NodeId) -> Option<NodeId> {
        self.granularity
            .as_deref()
            .and_then(|g| granularity_scope(tree, unit, g))
    }
}

fn union(defaults: &[String], user: &[String]) -> Vec<String> {
    let mut all = defaults.to_vec();
    for ty in user {
        if !all.contains(ty) {
            all.push(ty.clone());
        }
    }
    all
}
