//! Stateful pointer over a tree's units
//!
//! The nested tree is walked as one linear sequence: a scan that runs off the
//! end of a container resumes in the parent just past that container, and a
//! sequence met along the way is entered at its first (or last) child.
//!
//! **Design:** The scan is iterative. Descending into a sequence and climbing
//! out of an exhausted one are both just a change of `(container, index)`, so
//! deep trees never grow the stack.

use super::aggregate::UnitRef;
use super::node::{NodeId, NodeKind};
use super::tree::TimelineTree;
use std::sync::Arc;
use tracing::{debug, warn};

/// Walking direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }

    fn step(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Host knowledge of how document fragments nest
///
/// Timelines only know the fragments they narrate. When a user picks an
/// element that is not itself narrated, the host's document tells whether it
/// contains, or sits inside, a narrated one.
pub trait FragmentHierarchy {
    /// Whether element `inner_id` lies inside element `outer_id` of `href`
    fn contains(&self, href: &str, outer_id: &str, inner_id: &str) -> bool;
}

/// Position within one tree (or one subtree of it)
#[derive(Debug, Clone)]
pub struct TimelineCursor {
    tree: Arc<TimelineTree>,
    tree_index: usize,
    /// Container the cursor never leaves
    scope: NodeId,
    current: Option<NodeId>,
}

impl TimelineCursor {
    /// Cursor over a whole tree, positioned on its first unit
    pub fn new(tree: Arc<TimelineTree>, tree_index: usize) -> Self {
        let scope = tree.root();
        Self::over(tree, tree_index, scope)
    }

    /// Cursor confined to the subtree under `scope`, positioned on its first
    /// unit
    pub fn over(tree: Arc<TimelineTree>, tree_index: usize, scope: NodeId) -> Self {
        let mut cursor = Self {
            tree,
            tree_index,
            scope,
            current: None,
        };
        cursor.reset();
        cursor
    }

    pub fn tree(&self) -> &Arc<TimelineTree> {
        &self.tree
    }

    /// Index of the tree within its aggregate
    pub fn tree_index(&self) -> usize {
        self.tree_index
    }

    pub fn scope(&self) -> NodeId {
        self.scope
    }

    /// Current unit; `None` once iteration ran off either end
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn unit(&self) -> Option<UnitRef> {
        self.current.map(|node| UnitRef {
            tree: self.tree_index,
            node,
        })
    }

    /// First unit in scope, without moving
    pub fn first(&self) -> Option<NodeId> {
        if self.tree.node(self.scope).is_parallel() {
            return Some(self.scope);
        }
        self.find_parallel(0, self.scope, Direction::Forward)
    }

    /// Move to the first unit
    pub fn reset(&mut self) -> Option<NodeId> {
        self.current = self.first();
        self.current
    }

    /// Move to the last unit
    pub fn last(&mut self) -> Option<NodeId> {
        self.current = if self.tree.node(self.scope).is_parallel() {
            Some(self.scope)
        } else {
            let last = self.tree.children(self.scope).len() as isize - 1;
            self.find_parallel(last, self.scope, Direction::Backward)
        };
        self.current
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<NodeId> {
        self.step(Direction::Forward)
    }

    pub fn previous(&mut self) -> Option<NodeId> {
        self.step(Direction::Backward)
    }

    /// Move one unit in `direction`; stays `None` once off the end
    pub fn step(&mut self, direction: Direction) -> Option<NodeId> {
        self.current = self
            .current
            .and_then(|node| self.neighbour(node, direction));
        self.current
    }

    /// Whether [`next`](Self::next) would run off the end
    pub fn is_last(&self) -> bool {
        self.current
            .map(|node| self.neighbour(node, Direction::Forward).is_none())
            .unwrap_or(true)
    }

    /// Re-synchronize onto `par`
    ///
    /// Succeeds for any unit of this tree inside the cursor's scope; anything
    /// else leaves the cursor where it was.
    pub fn go_to(&mut self, par: NodeId) -> bool {
        let valid = self
            .tree
            .get(par)
            .map(|node| node.is_parallel())
            .unwrap_or(false)
            && self.tree.contains(self.scope, par);
        if valid {
            self.current = Some(par);
        } else {
            warn!("Cannot move cursor to {}: not a unit in scope {}", par, self.scope);
        }
        valid
    }

    /// Move to the first unit after the whole subtree under `node`
    pub fn skip_past(&mut self, node: NodeId) -> Option<NodeId> {
        self.current = if node != self.scope && self.tree.contains(self.scope, node) {
            self.neighbour(node, Direction::Forward)
        } else {
            None
        };
        self.current
    }

    /// Walk forward from the current unit to the first one narrating `id`
    ///
    /// Matches the unit's own fragment, then any enclosing sequence's text
    /// reference. On a miss the cursor keeps its position.
    pub fn find_by_fragment_id(&mut self, id: &str) -> bool {
        self.seek_fragment(id, None)
    }

    /// Like [`find_by_fragment_id`](Self::find_by_fragment_id), also
    /// accepting units whose element contains `id` or sits inside it
    pub fn find_by_fragment_id_in<H>(&mut self, id: &str, hierarchy: &H) -> bool
    where
        H: FragmentHierarchy + ?Sized,
    {
        let contains: &dyn Fn(&str, &str, &str) -> bool =
            &|href, outer, inner| hierarchy.contains(href, outer, inner);
        self.seek_fragment(id, Some(contains))
    }

    fn seek_fragment(
        &mut self,
        id: &str,
        contains: Option<&dyn Fn(&str, &str, &str) -> bool>,
    ) -> bool {
        let origin = self.current;
        let mut candidate = self.current.or_else(|| self.first());

        while let Some(unit) = candidate {
            if self.unit_matches(unit, id, contains) {
                debug!("Fragment {} resolved to unit {}", id, unit);
                self.current = Some(unit);
                return true;
            }
            candidate = self.neighbour(unit, Direction::Forward);
        }

        debug!("Fragment {} not narrated after {:?}", id, origin);
        self.current = origin;
        false
    }

    fn unit_matches(
        &self,
        unit: NodeId,
        id: &str,
        contains: Option<&dyn Fn(&str, &str, &str) -> bool>,
    ) -> bool {
        let Some(text) = self.tree.text_of(unit) else {
            return false;
        };
        let own = text.fragment_id.as_deref();

        if own == Some(id) {
            return true;
        }

        if self
            .tree
            .ancestors(unit)
            .any(|ancestor| self.tree.fragment_id(ancestor) == Some(id))
        {
            return true;
        }

        match (contains, own) {
            (Some(contains), Some(own)) => {
                contains(&text.src_file, id, own) || contains(&text.src_file, own, id)
            }
            _ => false,
        }
    }

    /// Unit adjacent to `node` in reading order, within scope
    fn neighbour(&self, node: NodeId, direction: Direction) -> Option<NodeId> {
        if node == self.scope {
            return None;
        }
        let parent = self.tree.parent(node)?;
        let start = self.tree.node(node).index as isize + direction.step();
        self.find_parallel(start, parent, direction)
    }

    /// Scan `container`'s children from `start` in `direction`
    ///
    /// Sequences are entered at their near end; an exhausted container hands
    /// over to its parent just past itself, up to the cursor's scope.
    pub fn find_parallel(
        &self,
        start: isize,
        container: NodeId,
        direction: Direction,
    ) -> Option<NodeId> {
        let mut container = container;
        let mut index = start;

        loop {
            let children = self.tree.children(container);
            let mut descended = false;

            while index >= 0 && (index as usize) < children.len() {
                let child = children[index as usize];
                match &self.tree.node(child).kind {
                    NodeKind::Parallel { .. } => return Some(child),
                    NodeKind::Sequence { children: inner, .. } => {
                        container = child;
                        index = match direction {
                            Direction::Forward => 0,
                            Direction::Backward => inner.len() as isize - 1,
                        };
                        descended = true;
                        break;
                    }
                    _ => index += direction.step(),
                }
            }

            if descended {
                continue;
            }
            if container == self.scope {
                return None;
            }
            let parent = self.tree.parent(container)?;
            index = self.tree.node(container).index as isize + direction.step();
            container = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::dto::TimelineDto;
    use crate::timeline::fixtures::*;
    use std::collections::HashSet;

    fn cursor(dto: &TimelineDto) -> TimelineCursor {
        TimelineCursor::new(Arc::new(TimelineTree::from_dto(dto).unwrap()), 0)
    }

    fn fragment(cursor: &TimelineCursor) -> Option<String> {
        cursor
            .current()
            .and_then(|p| cursor.tree().text_of(p))
            .and_then(|t| t.fragment_id.clone())
    }

    /// Nested tree with empty sequences at every awkward spot
    fn ragged() -> TimelineDto {
        timeline(
            "c1",
            "c1.xhtml",
            vec![
                seq(vec![]),
                seq(vec![
                    seq(vec![par("c1.xhtml#u0", "a.mp3", 0.0, 1.0)]),
                    par("c1.xhtml#u1", "a.mp3", 1.0, 2.0),
                    seq(vec![]),
                ]),
                par("c1.xhtml#u2", "a.mp3", 2.0, 3.0),
                seq(vec![seq(vec![
                    seq(vec![]),
                    par("c1.xhtml#u3", "a.mp3", 3.0, 4.0),
                    par("c1.xhtml#u4", "a.mp3", 4.0, 5.0),
                ])]),
                seq(vec![seq(vec![])]),
            ],
        )
    }

    #[test]
    fn test_nested_sequence_scenario() {
        let mut c = cursor(&timeline(
            "c1",
            "c1.xhtml",
            vec![
                seq(vec![
                    par("c1.xhtml#p0", "a.mp3", 0.0, 1.0),
                    par("c1.xhtml#p1", "a.mp3", 1.0, 2.0),
                ]),
                par("c1.xhtml#p2", "a.mp3", 2.0, 3.0),
            ],
        ));

        assert_eq!(fragment(&c).as_deref(), Some("p0"));
        c.next();
        assert_eq!(fragment(&c).as_deref(), Some("p1"));
        c.next();
        assert_eq!(fragment(&c).as_deref(), Some("p2"));
        assert!(c.is_last());
        assert_eq!(c.next(), None);
        // Stays off the end
        assert_eq!(c.next(), None);
        assert_eq!(c.previous(), None);
    }

    #[test]
    fn test_linearization_visits_every_unit_in_order() {
        let mut c = cursor(&ragged());
        let expected: Vec<NodeId> = c.tree().parallels().to_vec();
        assert_eq!(expected.len(), 5);

        let mut forward = vec![c.reset().unwrap()];
        while let Some(p) = c.next() {
            forward.push(p);
        }
        assert_eq!(forward, expected);
        let unique: HashSet<_> = forward.iter().collect();
        assert_eq!(unique.len(), forward.len());

        let mut backward = vec![c.last().unwrap()];
        while let Some(p) = c.previous() {
            backward.push(p);
        }
        backward.reverse();
        assert_eq!(backward, expected);
    }

    #[test]
    fn test_empty_tree_has_no_units() {
        let mut c = cursor(&timeline("c1", "c1.xhtml", vec![seq(vec![]), seq(vec![seq(vec![])])]));
        assert_eq!(c.current(), None);
        assert_eq!(c.last(), None);
        assert!(c.is_last());
        assert_eq!(c.unit(), None);
    }

    #[test]
    fn test_is_last_does_not_move() {
        let mut c = cursor(&simple_timeline("c1"));
        let first = c.current();
        assert!(!c.is_last());
        assert_eq!(c.current(), first);
        c.last();
        assert!(c.is_last());
        assert!(c.current().is_some());
    }

    #[test]
    fn test_go_to_and_unit() {
        let mut c = cursor(&ragged());
        let u3 = c.tree().nth_parallel(3).unwrap();
        assert!(c.go_to(u3));
        assert_eq!(c.unit(), Some(UnitRef { tree: 0, node: u3 }));
        assert_eq!(fragment(&c).as_deref(), Some("u3"));

        // Sequences are not units
        let root = c.tree().root();
        assert!(!c.go_to(root));
        assert_eq!(c.current(), Some(u3));
    }

    #[test]
    fn test_scoped_cursor_stays_inside_scope() {
        let tree = Arc::new(TimelineTree::from_dto(&ragged()).unwrap());
        let scope = tree.children(tree.root())[1];
        let mut c = TimelineCursor::over(tree.clone(), 0, scope);

        assert_eq!(fragment(&c).as_deref(), Some("u0"));
        c.next();
        assert_eq!(fragment(&c).as_deref(), Some("u1"));
        assert!(c.is_last());
        assert_eq!(c.next(), None);

        assert_eq!(c.last(), tree.nth_parallel(1));
        let u2 = tree.nth_parallel(2).unwrap();
        assert!(!c.go_to(u2));
    }

    #[test]
    fn test_skip_past_leaves_subtree() {
        let mut c = cursor(&ragged());
        let tree = c.tree().clone();
        let block = tree.children(tree.root())[1];

        assert_eq!(c.skip_past(block), tree.nth_parallel(2));

        let tail = tree.children(tree.root())[3];
        assert_eq!(c.skip_past(tail), None);
        assert_eq!(c.skip_past(tree.root()), None);
    }

    #[test]
    fn test_find_by_fragment_id_direct_and_text_ref() {
        let mut c = cursor(&timeline(
            "c1",
            "c1.xhtml",
            vec![
                par("c1.xhtml#intro", "a.mp3", 0.0, 1.0),
                seq_ref(
                    "c1.xhtml#table1",
                    vec![
                        par("c1.xhtml#cell1", "a.mp3", 1.0, 2.0),
                        par("c1.xhtml#cell2", "a.mp3", 2.0, 3.0),
                    ],
                ),
                par("c1.xhtml#outro", "a.mp3", 3.0, 4.0),
            ],
        ));

        assert!(c.find_by_fragment_id("cell2"));
        assert_eq!(fragment(&c).as_deref(), Some("cell2"));

        c.reset();
        assert!(c.find_by_fragment_id("table1"));
        assert_eq!(fragment(&c).as_deref(), Some("cell1"));

        // Search only walks forward
        assert!(c.find_by_fragment_id("outro"));
        assert!(!c.find_by_fragment_id("intro"));
        assert_eq!(fragment(&c).as_deref(), Some("outro"));
    }

    struct Dom(Vec<(&'static str, &'static str)>);

    impl FragmentHierarchy for Dom {
        fn contains(&self, _href: &str, outer_id: &str, inner_id: &str) -> bool {
            self.0.iter().any(|&(o, i)| o == outer_id && i == inner_id)
        }
    }

    #[test]
    fn test_find_by_fragment_id_uses_host_hierarchy() {
        let dto = timeline(
            "c1",
            "c1.xhtml",
            vec![
                par("c1.xhtml#s1", "a.mp3", 0.0, 1.0),
                par("c1.xhtml#s2", "a.mp3", 1.0, 2.0),
                par("c1.xhtml#s3", "a.mp3", 2.0, 3.0),
            ],
        );
        // para2 wraps s2 and s3; word7 sits inside s3
        let dom = Dom(vec![("para2", "s2"), ("para2", "s3"), ("s3", "word7")]);

        let mut c = cursor(&dto);
        assert!(c.find_by_fragment_id_in("para2", &dom));
        assert_eq!(fragment(&c).as_deref(), Some("s2"));

        c.reset();
        assert!(c.find_by_fragment_id_in("word7", &dom));
        assert_eq!(fragment(&c).as_deref(), Some("s3"));

        c.reset();
        assert!(!c.find_by_fragment_id("word7"));
        assert_eq!(fragment(&c).as_deref(), Some("s1"));
    }
}
