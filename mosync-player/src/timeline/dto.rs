//! Parsed timeline descriptions
//!
//! Serde mirror of an already-parsed narration timeline. Field names are
//! camelCase on the wire. Numeric fields are deliberately loose: producers
//! emit numbers, numeric strings and clock values interchangeably, so they
//! are carried as [`NumberLike`] and coerced during tree building.

use serde::{Deserialize, Serialize};

/// Whole-publication timeline description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicationDto {
    pub narrator: Option<String>,
    pub active_class: Option<String>,
    pub playback_active_class: Option<String>,
    /// Default skippable epubTypes declared by the publication
    pub skippables: Vec<String>,
    /// Default escapable epubTypes declared by the publication
    pub escapables: Vec<String>,
    /// Document manifest used to resolve text hrefs to manifest items
    pub manifest: Vec<ManifestItemDto>,
    /// One timeline per document, in reading order
    pub timelines: Vec<TimelineDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItemDto {
    pub id: String,
    pub href: String,
}

/// One document's timeline
///
/// A timeline without `documentId` (and none resolvable from its href) is a
/// blank placeholder page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDto {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_href: Option<String>,
    pub root: NodeDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "nodeType", rename_all = "lowercase")]
pub enum NodeDto {
    Seq(SeqDto),
    Par(ParDto),
    Text(TextDto),
    Audio(AudioDto),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeqDto {
    pub children: Vec<NodeDto>,
    #[serde(alias = "epub:type")]
    pub epub_type: Option<String>,
    /// `file#fragment` or bare fragment of the structure this seq narrates
    #[serde(alias = "epub:textref")]
    pub text_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParDto {
    pub children: Vec<NodeDto>,
    #[serde(alias = "epub:type")]
    pub epub_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextDto {
    /// Combined `file#fragment`; split during building
    pub src: Option<String>,
    pub src_file: Option<String>,
    pub src_fragment_id: Option<String>,
    pub manifest_item_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioDto {
    pub src: Option<String>,
    pub clip_begin: Option<NumberLike>,
    pub clip_end: Option<NumberLike>,
}

/// A number as found in the wild: JSON number or string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(f64),
    Text(String),
}

impl From<f64> for NumberLike {
    fn from(value: f64) -> Self {
        NumberLike::Number(value)
    }
}

impl From<&str> for NumberLike {
    fn from(value: &str) -> Self {
        NumberLike::Text(value.to_string())
    }
}
