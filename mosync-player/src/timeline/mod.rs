//! Narration timeline model
//!
//! - `dto`: serde form of an already-parsed timeline description
//! - `node`: arena node types
//! - `tree`: one document's timeline, built once and read-only afterwards
//! - `aggregate`: all documents concatenated into one publication timeline
//! - `cursor`: stateful pointer walking a tree's units in reading order

pub mod aggregate;
pub mod cursor;
pub mod dto;
pub mod node;
pub mod tree;

pub use aggregate::{AggregatePosition, TimelineAggregate, UnitRef};
pub use cursor::{Direction, FragmentHierarchy, TimelineCursor};
pub use dto::{NodeDto, PublicationDto, TimelineDto};
pub use node::{AudioClip, Node, NodeId, NodeKind, TextRef};
pub use tree::TimelineTree;

/// Compact DTO builders shared by unit tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::dto::*;

    /// Unit narrating `file#fragment` with clip `[begin, end]` of `audio`
    pub fn par(src: &str, audio: &str, begin: f64, end: f64) -> NodeDto {
        NodeDto::Par(ParDto {
            children: vec![
                NodeDto::Text(TextDto {
                    src: Some(src.to_string()),
                    ..Default::default()
                }),
                NodeDto::Audio(AudioDto {
                    src: Some(audio.to_string()),
                    clip_begin: Some(begin.into()),
                    clip_end: Some(end.into()),
                }),
            ],
            epub_type: None,
        })
    }

    /// Unit without narration audio (speech / embedded media)
    pub fn silent_par(src: &str) -> NodeDto {
        NodeDto::Par(ParDto {
            children: vec![NodeDto::Text(TextDto {
                src: Some(src.to_string()),
                ..Default::default()
            })],
            epub_type: None,
        })
    }

    pub fn typed(epub_type: &str, node: NodeDto) -> NodeDto {
        match node {
            NodeDto::Par(mut p) => {
                p.epub_type = Some(epub_type.to_string());
                NodeDto::Par(p)
            }
            NodeDto::Seq(mut s) => {
                s.epub_type = Some(epub_type.to_string());
                NodeDto::Seq(s)
            }
            other => other,
        }
    }

    pub fn seq(children: Vec<NodeDto>) -> NodeDto {
        NodeDto::Seq(SeqDto {
            children,
            ..Default::default()
        })
    }

    pub fn seq_ref(text_ref: &str, children: Vec<NodeDto>) -> NodeDto {
        NodeDto::Seq(SeqDto {
            children,
            text_ref: Some(text_ref.to_string()),
            ..Default::default()
        })
    }

    pub fn timeline(document_id: &str, href: &str, children: Vec<NodeDto>) -> TimelineDto {
        TimelineDto {
            document_id: Some(document_id.to_string()),
            document_href: Some(href.to_string()),
            root: seq(children),
        }
    }

    pub fn blank_timeline(href: &str) -> TimelineDto {
        TimelineDto {
            document_id: None,
            document_href: Some(href.to_string()),
            root: seq(vec![silent_par(href)]),
        }
    }

    /// Three-unit chapter: `p1` [0,2], `p2` [2,5], `p3` [5,6] of `<doc>.mp3`
    pub fn simple_timeline(document_id: &str) -> TimelineDto {
        let href = format!("{}.xhtml", document_id);
        let audio = format!("{}.mp3", document_id);
        timeline(
            document_id,
            &href,
            vec![
                par(&format!("{}#p1", href), &audio, 0.0, 2.0),
                par(&format!("{}#p2", href), &audio, 2.0, 5.0),
                par(&format!("{}#p3", href), &audio, 5.0, 6.0),
            ],
        )
    }
}
