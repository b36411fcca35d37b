//! Timeline node arena types
//!
//! Nodes live in a flat `Vec` owned by their tree and refer to each other by
//! [`NodeId`]. Parents are back-pointers by index, so there are no ownership
//! cycles and walking to the root is an O(depth) index chase.

use mosync_common::time::secs_to_ms;

/// Index of a node within its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference from a unit to a fragment of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRef {
    /// Document href, without fragment
    pub src_file: String,
    /// Fragment id within the document (None means the whole document)
    pub fragment_id: Option<String>,
    /// Manifest item the href resolved to at build time
    pub manifest_item: Option<String>,
}

impl TextRef {
    /// Split a `file#fragment` reference
    pub fn from_src(src: &str) -> Self {
        let (file, fragment) = split_fragment(src);
        Self {
            src_file: file.to_string(),
            fragment_id: fragment.map(str::to_string),
            manifest_item: None,
        }
    }

    /// Combined `file#fragment` form
    pub fn src(&self) -> String {
        match &self.fragment_id {
            Some(id) => format!("{}#{}", self.src_file, id),
            None => self.src_file.clone(),
        }
    }
}

/// Split `file#fragment` into its parts; empty fragments become `None`
pub fn split_fragment(src: &str) -> (&str, Option<&str>) {
    match src.split_once('#') {
        Some((file, fragment)) if !fragment.is_empty() => (file, Some(fragment)),
        Some((file, _)) => (file, None),
        None => (src, None),
    }
}

/// Audio clip bound to a unit
///
/// `clip_end` is either greater than `clip_begin` or `f64::INFINITY`
/// (open-ended). A clip without `src` marks a unit that is rendered by
/// speech synthesis, embedded media or a blank-page dwell instead.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub src: Option<String>,
    pub clip_begin: f64,
    pub clip_end: f64,
}

impl AudioClip {
    /// Synthesized clip for units without narration
    pub fn placeholder() -> Self {
        Self {
            src: None,
            clip_begin: 0.0,
            clip_end: f64::INFINITY,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.clip_end.is_infinite()
    }

    pub fn has_source(&self) -> bool {
        self.src.is_some()
    }

    /// Clip length in seconds; open-ended clips count as zero
    pub fn duration_secs(&self) -> f64 {
        if self.is_open_ended() {
            0.0
        } else {
            self.clip_end - self.clip_begin
        }
    }

    pub fn duration_ms(&self) -> f64 {
        secs_to_ms(self.duration_secs())
    }

    /// Whether `position_secs` lies within `[clip_begin - tolerance, clip_end]`
    pub fn contains(&self, position_secs: f64, tolerance_secs: f64) -> bool {
        position_secs >= self.clip_begin - tolerance_secs && position_secs <= self.clip_end
    }
}

/// The four node variants
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Ordered container of sequences and parallels
    Sequence {
        children: Vec<NodeId>,
        epub_type: Option<String>,
        /// Fragment id of the structure this sequence narrates
        text_ref: Option<String>,
    },
    /// Synchronizable unit: exactly one text and one audio child
    Parallel {
        text: NodeId,
        audio: NodeId,
        epub_type: Option<String>,
    },
    Text(TextRef),
    Audio(AudioClip),
}

/// Arena slot
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Position among the parent's children
    pub index: usize,
}

impl Node {
    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, NodeKind::Sequence { .. })
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, NodeKind::Parallel { .. })
    }

    /// Raw epubType attribute of containers
    pub fn epub_type(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Sequence { epub_type, .. } | NodeKind::Parallel { epub_type, .. } => {
                epub_type.as_deref()
            }
            _ => None,
        }
    }

    /// epubType is a whitespace-separated list
    pub fn has_epub_type(&self, wanted: &str) -> bool {
        self.epub_type()
            .map(|types| types.split_whitespace().any(|t| t == wanted))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("c1.xhtml#p1"), ("c1.xhtml", Some("p1")));
        assert_eq!(split_fragment("c1.xhtml#"), ("c1.xhtml", None));
        assert_eq!(split_fragment("c1.xhtml"), ("c1.xhtml", None));
    }

    #[test]
    fn test_text_ref_src_roundtrip() {
        let text = TextRef::from_src("dir/c2.xhtml#s4");
        assert_eq!(text.src_file, "dir/c2.xhtml");
        assert_eq!(text.fragment_id.as_deref(), Some("s4"));
        assert_eq!(text.src(), "dir/c2.xhtml#s4");
    }

    #[test]
    fn test_open_ended_clip_has_zero_duration() {
        let clip = AudioClip::placeholder();
        assert!(clip.is_open_ended());
        assert!(!clip.has_source());
        assert_eq!(clip.duration_ms(), 0.0);
        assert!(clip.contains(1.0e9, 0.0));
    }

    #[test]
    fn test_clip_contains_honors_tolerance() {
        let clip = AudioClip {
            src: Some("a.mp3".to_string()),
            clip_begin: 2.0,
            clip_end: 4.0,
        };
        assert_eq!(clip.duration_ms(), 2000.0);
        assert!(clip.contains(1.96, 0.05));
        assert!(!clip.contains(1.9, 0.05));
        assert!(clip.contains(4.0, 0.05));
        assert!(!clip.contains(4.01, 0.05));
    }

    #[test]
    fn test_epub_type_list_matching() {
        let node = Node {
            kind: NodeKind::Sequence {
                children: vec![],
                epub_type: Some("aside footnote".to_string()),
                text_ref: None,
            },
            parent: None,
            index: 0,
        };
        assert!(node.has_epub_type("footnote"));
        assert!(node.has_epub_type("aside"));
        assert!(!node.has_epub_type("foot"));
    }
}
