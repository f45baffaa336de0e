//! Qdrant vector store integration over the REST API.

pub mod client;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use payload::{PassagePayload, compute_chunk_hash};
pub use types::{PointInsert, QdrantError, ScoredPoint};
