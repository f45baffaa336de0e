//! Helpers for constructing, hashing, and reading back passage payloads.

use crate::processing::Passage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload stored with each passage vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassagePayload {
    /// Filename of the parent document.
    pub document: String,
    /// Source segment index.
    pub segment: usize,
    /// Passage position across the document; defines dump order.
    pub position: usize,
    /// Byte offset of the passage within its segment.
    pub start: usize,
    /// Byte offset one past the end of the passage.
    pub end: usize,
    /// Passage text.
    pub text: String,
    /// SHA-256 of the text, hex encoded.
    pub chunk_hash: String,
    /// Ingestion time, RFC 3339.
    pub indexed_at: String,
}

impl PassagePayload {
    /// Build the payload for `passage`, stamped with `indexed_at`.
    pub fn from_passage(passage: &Passage, indexed_at: &str) -> Self {
        Self {
            document: passage.document.clone(),
            segment: passage.segment,
            position: passage.position,
            start: passage.start,
            end: passage.end,
            text: passage.text.clone(),
            chunk_hash: compute_chunk_hash(&passage.text),
            indexed_at: indexed_at.to_string(),
        }
    }

    /// Decode a payload map returned by a query or scroll.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Convert back into the passage it was built from.
    pub fn into_passage(self) -> Passage {
        Passage {
            document: self.document,
            segment: self.segment,
            position: self.position,
            start: self.start,
            end: self.end,
            text: self.text,
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a point identifier accepted by Qdrant.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
