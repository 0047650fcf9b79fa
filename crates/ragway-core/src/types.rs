//! Domain types shared by backends, fusion and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type CollectionId = String;
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Metadata attached to every indexed chunk.
///
/// The named fields are always present; anything else the ingestion side
/// attached is carried verbatim in `extra` and flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub document_name: String,
    #[serde(default)]
    pub document_part: u32,
    pub collection_id: CollectionId,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Meta,
}

/// A passage of a source document, immutable once indexed.
///
/// Identity is `(metadata.collection_id, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn collection_id(&self) -> &str {
        &self.metadata.collection_id
    }

    pub fn document_name(&self) -> &str {
        &self.metadata.document_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub embedding_model: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub owner: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub document_count: u64,
}

/// Collection ids double as table and directory names in the local backend.
pub fn validate_collection_id(id: &str) -> crate::error::Result<()> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid collection id '{id}'")))
    }
}

/// A single retrieval method a backend executes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMethod {
    Lexical,
    Semantic,
}

impl QueryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The method requested by a caller; `Hybrid` runs both and fuses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Lexical,
    Semantic,
    Hybrid,
}

impl SearchMethod {
    pub fn components(self) -> &'static [QueryMethod] {
        match self {
            Self::Lexical => &[QueryMethod::Lexical],
            Self::Semantic => &[QueryMethod::Semantic],
            Self::Hybrid => &[QueryMethod::Lexical, QueryMethod::Semantic],
        }
    }

    pub fn needs_vector(self) -> bool {
        self.components().contains(&QueryMethod::Semantic)
    }

    pub fn needs_text(self) -> bool {
        self.components().contains(&QueryMethod::Lexical)
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        })
    }
}

impl FromStr for SearchMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::InvalidInput(format!("unknown search method '{other}'"))),
        }
    }
}

/// Which retrieval pass(es) produced a result.
///
/// A single pass gives `lexical`, `semantic` or `web`. Fusion appends the tag of
/// every further list a chunk shows up in, so a chunk found by both passes reads
/// `lexical/semantic`. Repeats are kept: fusing the same pass twice yields
/// `semantic/semantic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodTag(String);

impl MethodTag {
    pub const WEB: &'static str = "web";

    pub fn web() -> Self {
        Self(Self::WEB.to_string())
    }

    pub fn append(&mut self, other: &MethodTag) {
        self.0.push('/');
        self.0.push_str(&other.0);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<QueryMethod> for MethodTag {
    fn from(method: QueryMethod) -> Self {
        Self(method.as_str().to_string())
    }
}

impl fmt::Display for MethodTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ranked hit. `score` is method-specific (BM25, cosine similarity) until
/// the list has gone through fusion, after which it is the fused rank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub method: MethodTag,
    pub score: f64,
    pub chunk: Chunk,
}

/// Borrowed inputs for a single backend query.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub collection_ids: &'a [CollectionId],
    pub text: Option<&'a str>,
    pub vector: Option<&'a [f32]>,
    pub k: usize,
    pub score_threshold: Option<f32>,
}

/// Backend-specific pagination position.
///
/// One backend pages with row offsets, another with the id of the next point.
/// Callers hand back whatever they received and never interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Cursor {
    Numeric(u64),
    Opaque(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChunkPage {
    pub chunks: Vec<Chunk>,
    pub next: Option<Cursor>,
}

/// The classifier's judgment of the current context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Unclear = 0,
    Answerable = 1,
    NoContextNeeded = 2,
    InsufficientContext = 3,
    NeedsWebSearch = 4,
}

impl Verdict {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Unclear),
            1 => Some(Self::Answerable),
            2 => Some(Self::NoContextNeeded),
            3 => Some(Self::InsufficientContext),
            4 => Some(Self::NeedsWebSearch),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unclear => "unclear",
            Self::Answerable => "answerable",
            Self::NoContextNeeded => "no_context_needed",
            Self::InsufficientContext => "insufficient_context",
            Self::NeedsWebSearch => "needs_web_search",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tag_keeps_repeats() {
        let mut tag = MethodTag::from(QueryMethod::Semantic);
        tag.append(&MethodTag::from(QueryMethod::Lexical));
        tag.append(&MethodTag::from(QueryMethod::Semantic));
        assert_eq!(tag.as_str(), "semantic/lexical/semantic");
    }

    #[test]
    fn metadata_flattens_extra_fields() {
        let json = serde_json::json!({
            "id": "c1",
            "content": "text",
            "metadata": {
                "document_id": "d1",
                "document_name": "manual.pdf",
                "document_part": 3,
                "collection_id": "docs",
                "created_at": "2024-01-01T00:00:00Z",
                "page": 12
            }
        });
        let chunk: Chunk = serde_json::from_value(json).expect("chunk");
        assert_eq!(chunk.metadata.document_part, 3);
        assert_eq!(chunk.metadata.extra.get("page"), Some(&serde_json::json!(12)));
    }

    #[test]
    fn cursor_is_tagged() {
        let c = serde_json::to_value(Cursor::Opaque("abc".into())).expect("json");
        assert_eq!(c, serde_json::json!({"kind": "opaque", "value": "abc"}));
    }

    #[test]
    fn collection_ids_are_restricted() {
        assert!(validate_collection_id("team-docs_2").is_ok());
        assert!(validate_collection_id("").is_err());
        assert!(validate_collection_id("../etc").is_err());
        assert!(validate_collection_id("a b").is_err());
    }

    #[test]
    fn verdict_codes_round_trip() {
        for code in 0..5 {
            let v = Verdict::from_code(code).expect("verdict");
            assert_eq!(u32::from(v.code()), code);
        }
        assert!(Verdict::from_code(7).is_none());
    }
}
