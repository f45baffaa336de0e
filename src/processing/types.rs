//! Core data types and error definitions for the document pipeline.

use crate::{
    completion::CompletionClientError, embedding::EmbeddingClientError, index::IndexError,
    loader::LoadError, processing::guardrail::GuardrailOutcome,
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced while configuring the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Overlap must leave room for new text in every passage.
    #[error("chunk size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidChunkSize {
        /// Requested maximum passage length in characters.
        chunk_size: usize,
        /// Requested overlap in characters.
        overlap: usize,
    },
}

/// Errors emitted by the document pipeline and mapped to HTTP statuses by the API layer.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Upload could not be identified or parsed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// A question or extraction arrived before any document was indexed.
    #[error("No document uploaded. Please upload a document first.")]
    NoDocument,
    /// Embedding or storing the uploaded passages failed.
    #[error("Failed to index document: {0}")]
    Ingest(#[source] IndexError),
    /// Embedding the question or querying the index failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] IndexError),
    /// A concurrent upload of a newer document completed first.
    #[error("A newer document was uploaded while this one was processing")]
    Superseded,
}

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    /// Embedding backend could not be constructed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Completion backend could not be constructed.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Vector store could not be reached or prepared.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Bounded-length text span cut from one segment of the uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// Filename of the parent document.
    pub document: String,
    /// Index of the source segment (PDF page, or `0` for single-segment formats).
    pub segment: usize,
    /// Position of this passage across the whole document.
    pub position: usize,
    /// Byte offset of the first character within the segment text.
    pub start: usize,
    /// Byte offset one past the last character within the segment text.
    pub end: usize,
    /// Passage text, equal to `segment_text[start..end]`.
    pub text: String,
}

impl Passage {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A retrieved passage and the similarity reported by the index, when exposed.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    /// Passage returned by the index.
    pub passage: Passage,
    /// Similarity to the query; `None` when the retriever does not expose scores.
    pub score: Option<f32>,
}

/// Summary of a completed upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// Filename of the indexed document.
    pub filename: String,
    /// Number of passages written to the new collection.
    pub chunks_created: usize,
    /// Sum of passage lengths in characters (overlap counted once per passage).
    pub total_characters: usize,
}

/// Answer to a question, ready to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    /// Answer text after the guardrail.
    pub answer: String,
    /// Previews of up to three retrieved passages.
    pub sources: Vec<String>,
    /// Confidence rounded to three decimals.
    pub confidence: f64,
    /// Guardrail decision.
    pub metadata: GuardrailOutcome,
}

/// Snapshot of the active collection used by `GET /status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStatus {
    /// Filename of the active document, if any.
    pub current_document: Option<String>,
    /// Whether a populated collection is active.
    pub vector_store_initialized: bool,
}
