//! Document pipeline: chunking, retrieval-augmented answering, and field extraction.

pub mod answer;
pub mod chunking;
pub mod confidence;
pub mod extraction;
pub mod guardrail;
mod service;
pub mod types;

pub use extraction::{ExtractionError, ExtractionRecord};
pub use guardrail::GuardrailOutcome;
pub use service::{DocumentApi, DocumentService};
pub use types::{
    AnswerRecord, ChunkingError, IndexStatus, InitError, Passage, ProcessingError,
    ScoredPassage, UploadOutcome,
};
