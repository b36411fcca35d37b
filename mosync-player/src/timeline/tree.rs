//! One document's narration timeline
//!
//! Built once from a [`TimelineDto`]; read-only afterwards. Building never
//! fails on malformed timing data: strings are coerced, missing children are
//! synthesized and out-of-range clips are clamped, each with a `warn!`.

use super::dto::{AudioDto, NodeDto, NumberLike, ParDto, SeqDto, TextDto, TimelineDto};
use super::node::{split_fragment, AudioClip, Node, NodeId, NodeKind, TextRef};
use crate::error::{Error, Result};
use mosync_common::time::parse_clock_value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

const ROOT: NodeId = NodeId(0);

/// Deepest sequence nesting accepted; deeper subtrees are dropped
const MAX_DEPTH: usize = 64;

/// Narration timeline of one document
#[derive(Debug, Clone)]
pub struct TimelineTree {
    nodes: Vec<Node>,
    document_id: Option<String>,
    document_href: Option<String>,
    known_sync_types: BTreeSet<String>,
    /// Units in reading order
    parallels: Vec<NodeId>,
    /// Per-node contributing duration (ms), indexed like `nodes`
    durations_ms: Vec<f64>,
}

impl TimelineTree {
    /// Build a tree, resolving text hrefs through `manifest` (href → item id)
    pub fn build(dto: &TimelineDto, manifest: &HashMap<String, String>) -> Result<Self> {
        let document_id = dto.document_id.clone().or_else(|| {
            dto.document_href
                .as_ref()
                .and_then(|href| manifest.get(href).cloned())
        });

        let mut builder = TreeBuilder {
            nodes: Vec::new(),
            manifest,
            document_id,
            document_href: dto.document_href.clone(),
            known_sync_types: BTreeSet::new(),
        };

        match &dto.root {
            NodeDto::Seq(seq) => {
                builder.build_sequence(seq, None, 0, 0);
            }
            NodeDto::Par(par) => {
                debug!("Timeline root is a par, wrapping it in a sequence");
                let wrapper = SeqDto {
                    children: vec![NodeDto::Par(par.clone())],
                    ..Default::default()
                };
                builder.build_sequence(&wrapper, None, 0, 0);
            }
            NodeDto::Text(_) | NodeDto::Audio(_) => {
                return Err(Error::Timeline(format!(
                    "timeline root for {:?} must be a seq or par",
                    dto.document_href
                )));
            }
        }

        Ok(builder.finish())
    }

    /// Build without a manifest
    pub fn from_dto(dto: &TimelineDto) -> Result<Self> {
        Self::build(dto, &HashMap::new())
    }

    /// Placeholder timeline for a document without narration
    ///
    /// Has no document id; playback dwells silently on `href` for the
    /// configured blank-page time and moves on.
    pub fn blank_page(href: &str) -> Self {
        let empty = HashMap::new();
        let mut builder = TreeBuilder {
            nodes: Vec::new(),
            manifest: &empty,
            document_id: None,
            document_href: Some(href.to_string()),
            known_sync_types: BTreeSet::new(),
        };
        let wrapper = SeqDto {
            children: vec![NodeDto::Par(ParDto {
                children: vec![NodeDto::Text(TextDto {
                    src_file: Some(href.to_string()),
                    ..Default::default()
                })],
                epub_type: None,
            })],
            ..Default::default()
        };
        builder.build_sequence(&wrapper, None, 0, 0);
        builder.finish()
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Node by id. Ids are only minted by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Sequence children; empty for every other kind
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Sequence { children, .. } => children,
            _ => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Strict ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    pub fn text_of(&self, par: NodeId) -> Option<&TextRef> {
        match &self.node(par).kind {
            NodeKind::Parallel { text, .. } => match &self.node(*text).kind {
                NodeKind::Text(text) => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn audio_of(&self, par: NodeId) -> Option<&AudioClip> {
        match &self.node(par).kind {
            NodeKind::Parallel { audio, .. } => match &self.node(*audio).kind {
                NodeKind::Audio(clip) => Some(clip),
                _ => None,
            },
            _ => None,
        }
    }

    /// Nearest container (optionally `node` itself) tagged with `epub_type`
    pub fn first_ancestor_with_type(
        &self,
        node: NodeId,
        epub_type: &str,
        include_self: bool,
    ) -> Option<NodeId> {
        let start = if include_self {
            Some(node)
        } else {
            self.parent(node)
        };
        std::iter::successors(start, |&n| self.parent(n))
            .find(|&n| self.node(n).has_epub_type(epub_type))
    }

    /// Fragment id a container stands for: a unit's text fragment or a
    /// sequence's text reference
    pub fn fragment_id(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Parallel { .. } => self.text_of(node).and_then(|t| t.fragment_id.as_deref()),
            NodeKind::Sequence { text_ref, .. } => text_ref.as_deref(),
            NodeKind::Text(text) => text.fragment_id.as_deref(),
            NodeKind::Audio(_) => None,
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn document_href(&self) -> Option<&str> {
        self.document_href.as_deref()
    }

    /// Placeholder page without narration
    pub fn is_blank(&self) -> bool {
        self.document_id.is_none()
    }

    /// epubTypes seen on any container
    pub fn known_sync_types(&self) -> &BTreeSet<String> {
        &self.known_sync_types
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// All units in reading order
    pub fn parallels(&self) -> &[NodeId] {
        &self.parallels
    }

    /// The `n`-th unit in reading order (0-based)
    pub fn nth_parallel(&self, n: usize) -> Option<NodeId> {
        self.parallels.get(n).copied()
    }

    /// Inverse of [`nth_parallel`](Self::nth_parallel)
    pub fn ordinal_of(&self, par: NodeId) -> Option<usize> {
        self.parallels.iter().position(|&p| p == par)
    }

    /// Units whose text belongs to another document are cross-references:
    /// they are walked by cursors but carry no time.
    pub fn belongs_to_document(&self, par: NodeId) -> bool {
        match (self.document_id.as_deref(), self.text_of(par)) {
            (Some(doc), Some(text)) => text.manifest_item.as_deref() == Some(doc),
            _ => false,
        }
    }

    /// Milliseconds a unit contributes to the timeline
    fn unit_duration_ms(&self, par: NodeId) -> f64 {
        if !self.belongs_to_document(par) {
            return 0.0;
        }
        self.audio_of(par).map(AudioClip::duration_ms).unwrap_or(0.0)
    }

    // ------------------------------------------------------------------
    // Time queries
    // ------------------------------------------------------------------

    /// Total narration time of the document
    pub fn duration_ms(&self) -> f64 {
        self.durations_ms[ROOT.0]
    }

    /// Narration time under `node`
    pub fn duration_ms_of(&self, node: NodeId) -> f64 {
        self.durations_ms[node.0]
    }

    /// Unit sounding at `time_ms` from the start of the document
    ///
    /// Windows are closed at their end: `parallel_at(duration_ms())` is the
    /// last timed unit and `parallel_at(0)` the first one. Units without
    /// time are never returned.
    pub fn parallel_at(&self, time_ms: f64) -> Option<NodeId> {
        if !(time_ms >= 0.0) {
            return None;
        }
        self.parallel_at_in(ROOT, time_ms)
    }

    fn parallel_at_in(&self, container: NodeId, time_ms: f64) -> Option<NodeId> {
        let mut offset = 0.0;
        for &child in self.children(container) {
            let adjusted = time_ms - offset;
            match &self.node(child).kind {
                NodeKind::Parallel { .. } => {
                    let clip_ms = self.unit_duration_ms(child);
                    if clip_ms > 0.0 && adjusted <= clip_ms {
                        return Some(child);
                    }
                    offset += clip_ms;
                }
                NodeKind::Sequence { .. } => {
                    if let Some(found) = self.parallel_at_in(child, adjusted) {
                        return Some(found);
                    }
                    offset += self.durations_ms[child.0];
                }
                _ => {}
            }
        }
        None
    }

    /// Time elapsed before `target` starts; `None` if it is not a unit here
    pub fn clip_offset(&self, target: NodeId) -> Option<f64> {
        if !self.get(target).map(Node::is_parallel).unwrap_or(false) {
            return None;
        }
        let mut offset = 0.0;
        self.clip_offset_in(ROOT, target, &mut offset)
            .then_some(offset)
    }

    fn clip_offset_in(&self, container: NodeId, target: NodeId, offset: &mut f64) -> bool {
        for &child in self.children(container) {
            if child == target {
                return true;
            }
            match &self.node(child).kind {
                NodeKind::Parallel { .. } => *offset += self.unit_duration_ms(child),
                NodeKind::Sequence { .. } => {
                    if self.clip_offset_in(child, target, offset) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

/// Recursive DTO → arena builder
struct TreeBuilder<'a> {
    nodes: Vec<Node>,
    manifest: &'a HashMap<String, String>,
    document_id: Option<String>,
    document_href: Option<String>,
    known_sync_types: BTreeSet<String>,
}

impl TreeBuilder<'_> {
    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>, index: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            index,
        });
        id
    }

    fn register_types(&mut self, epub_type: Option<&str>) {
        if let Some(types) = epub_type {
            self.known_sync_types
                .extend(types.split_whitespace().map(str::to_string));
        }
    }

    fn build_sequence(
        &mut self,
        dto: &SeqDto,
        parent: Option<NodeId>,
        index: usize,
        depth: usize,
    ) -> NodeId {
        let text_ref = dto
            .text_ref
            .as_deref()
            .map(|r| match split_fragment(r) {
                (_, Some(fragment)) => fragment.to_string(),
                (file, None) => file.to_string(),
            })
            .filter(|r| !r.is_empty());
        self.register_types(dto.epub_type.as_deref());

        let id = self.push(
            NodeKind::Sequence {
                children: Vec::new(),
                epub_type: dto.epub_type.clone(),
                text_ref,
            },
            parent,
            index,
        );

        let mut children = Vec::with_capacity(dto.children.len());
        for child in &dto.children {
            match child {
                NodeDto::Seq(seq) if depth + 1 > MAX_DEPTH => {
                    warn!(
                        "Sequence nesting deeper than {} under {:?}, dropping {} children",
                        MAX_DEPTH,
                        self.document_href,
                        seq.children.len()
                    );
                }
                NodeDto::Seq(seq) => {
                    let child_id = self.build_sequence(seq, Some(id), children.len(), depth + 1);
                    children.push(child_id);
                }
                NodeDto::Par(par) => {
                    let child_id = self.build_parallel(par, id, children.len());
                    children.push(child_id);
                }
                NodeDto::Text(_) | NodeDto::Audio(_) => {
                    warn!(
                        "Media node directly inside a sequence of {:?}, ignored",
                        self.document_href
                    );
                }
            }
        }

        if let NodeKind::Sequence { children: slot, .. } = &mut self.nodes[id.0].kind {
            *slot = children;
        }
        id
    }

    fn build_parallel(&mut self, dto: &ParDto, parent: NodeId, index: usize) -> NodeId {
        self.register_types(dto.epub_type.as_deref());

        let mut text_dto = None;
        let mut audio_dto = None;
        for child in &dto.children {
            match child {
                NodeDto::Text(text) if text_dto.is_none() => text_dto = Some(text),
                NodeDto::Audio(audio) if audio_dto.is_none() => audio_dto = Some(audio),
                NodeDto::Text(_) | NodeDto::Audio(_) => {
                    warn!("Extra media child in par of {:?}, ignored", self.document_href);
                }
                NodeDto::Seq(_) | NodeDto::Par(_) => {
                    warn!("Container nested in par of {:?}, ignored", self.document_href);
                }
            }
        }

        // Child ids are patched in once the children exist
        let id = self.push(
            NodeKind::Parallel {
                text: NodeId(usize::MAX),
                audio: NodeId(usize::MAX),
                epub_type: dto.epub_type.clone(),
            },
            Some(parent),
            index,
        );

        let text = self.resolve_text(text_dto);
        let clip = self.normalize_audio(audio_dto);
        let text_id = self.push(NodeKind::Text(text), Some(id), 0);
        let audio_id = self.push(NodeKind::Audio(clip), Some(id), 1);

        if let NodeKind::Parallel { text, audio, .. } = &mut self.nodes[id.0].kind {
            *text = text_id;
            *audio = audio_id;
        }
        id
    }

    fn resolve_text(&self, dto: Option<&TextDto>) -> TextRef {
        let Some(dto) = dto else {
            warn!(
                "Par without text in {:?}, pointing it at the whole document",
                self.document_href
            );
            return TextRef {
                src_file: self.document_href.clone().unwrap_or_default(),
                fragment_id: None,
                manifest_item: self.document_id.clone(),
            };
        };

        let (combined_file, combined_fragment) = dto
            .src
            .as_deref()
            .map(split_fragment)
            .unwrap_or(("", None));

        let src_file = dto
            .src_file
            .clone()
            .filter(|f| !f.is_empty())
            .or_else(|| (!combined_file.is_empty()).then(|| combined_file.to_string()))
            .or_else(|| self.document_href.clone())
            .unwrap_or_default();
        let fragment_id = dto
            .src_fragment_id
            .clone()
            .filter(|f| !f.is_empty())
            .or_else(|| combined_fragment.map(str::to_string));

        let manifest_item = dto
            .manifest_item_id
            .clone()
            .or_else(|| self.manifest.get(&src_file).cloned())
            .or_else(|| match self.document_href.as_deref() {
                None => self.document_id.clone(),
                Some(href) if href == src_file => self.document_id.clone(),
                Some(_) => None,
            });

        TextRef {
            src_file,
            fragment_id,
            manifest_item,
        }
    }

    fn normalize_audio(&self, dto: Option<&AudioDto>) -> AudioClip {
        let Some(dto) = dto else {
            return AudioClip::placeholder();
        };

        let src = dto.src.clone().filter(|s| !s.trim().is_empty());
        let mut clip_begin = dto
            .clip_begin
            .as_ref()
            .and_then(|v| coerce_seconds("clipBegin", v))
            .unwrap_or(0.0);
        if clip_begin < 0.0 {
            warn!("Negative clipBegin {} for {:?}, clamped to 0", clip_begin, src);
            clip_begin = 0.0;
        }

        let clip_end = match dto.clip_end.as_ref().and_then(|v| coerce_seconds("clipEnd", v)) {
            Some(end) if end > clip_begin => end,
            Some(end) => {
                debug!(
                    "clipEnd {} not after clipBegin {} for {:?}, treating as open-ended",
                    end, clip_begin, src
                );
                f64::INFINITY
            }
            None => f64::INFINITY,
        };

        AudioClip {
            src,
            clip_begin,
            clip_end,
        }
    }

    fn finish(self) -> TimelineTree {
        let mut tree = TimelineTree {
            nodes: self.nodes,
            document_id: self.document_id,
            document_href: self.document_href,
            known_sync_types: self.known_sync_types,
            parallels: Vec::new(),
            durations_ms: Vec::new(),
        };

        let mut parallels = Vec::new();
        collect_parallels(&tree, ROOT, &mut parallels);
        tree.parallels = parallels;

        let mut durations = vec![0.0; tree.nodes.len()];
        compute_durations(&tree, ROOT, &mut durations);
        tree.durations_ms = durations;

        debug!(
            "Built timeline for {:?}: {} units, {:.0} ms",
            tree.document_href,
            tree.parallels.len(),
            tree.duration_ms()
        );
        tree
    }
}

fn collect_parallels(tree: &TimelineTree, container: NodeId, out: &mut Vec<NodeId>) {
    for &child in tree.children(container) {
        if tree.node(child).is_parallel() {
            out.push(child);
        } else {
            collect_parallels(tree, child, out);
        }
    }
}

fn compute_durations(tree: &TimelineTree, node: NodeId, out: &mut [f64]) -> f64 {
    let total = match &tree.node(node).kind {
        NodeKind::Parallel { .. } => tree.unit_duration_ms(node),
        NodeKind::Sequence { children, .. } => children
            .iter()
            .map(|&child| compute_durations(tree, child, out))
            .sum(),
        _ => 0.0,
    };
    out[node.0] = total;
    total
}

/// Numbers pass through; strings are parsed as clock values. Anything else
/// is logged and dropped so the caller's default applies.
fn coerce_seconds(field: &str, value: &NumberLike) -> Option<f64> {
    match value {
        NumberLike::Number(n) if n.is_finite() => Some(*n),
        NumberLike::Number(n) => {
            warn!("Non-finite {} {}, ignored", field, n);
            None
        }
        NumberLike::Text(raw) => match parse_clock_value(raw) {
            Some(secs) => {
                debug!("Coerced {} {:?} to {}s", field, raw, secs);
                Some(secs)
            }
            None => {
                warn!("Unparseable {} {:?}, ignored", field, raw);
                None
            }
        },
    }
}
