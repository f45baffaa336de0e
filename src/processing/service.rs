//! Document service coordinating loading, chunking, retrieval, and generation.

use crate::{
    completion::{CompletionClient, build_completion_client},
    config::Config,
    embedding::build_embedding_client,
    index::{DocumentIndex, IndexError, TOP_K, build_vector_store},
    loader::load_upload,
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        answer::generate_answer,
        chunking::TextChunker,
        confidence,
        extraction::{ExtractionRecord, extract_fields},
        guardrail::{self, GuardedAnswer},
        types::{
            AnswerRecord, IndexStatus, InitError, Passage, ProcessingError, ScoredPassage,
            UploadOutcome,
        },
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Number of retrieved passages echoed back as sources.
const SOURCE_PREVIEWS: usize = 3;
/// Characters kept per source preview.
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Owns the active document index and the model clients used to answer questions about it.
///
/// Construct the service once near process start and share it through an `Arc`.
pub struct DocumentService {
    index: DocumentIndex,
    completion: Arc<dyn CompletionClient>,
    chunker: TextChunker,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the document pipeline used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Parse, chunk, and index an uploaded file, replacing the active document.
    async fn upload(
        &self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ProcessingError>;

    /// Answer a question about the active document.
    async fn ask(&self, question: &str) -> Result<AnswerRecord, ProcessingError>;

    /// Extract shipment fields from the active document.
    async fn extract(&self) -> Result<ExtractionRecord, ProcessingError>;

    /// Describe the active document.
    async fn status(&self) -> IndexStatus;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Build the service and its backends from configuration.
    pub async fn new(config: &Config) -> Result<Self, InitError> {
        let embedder = build_embedding_client(config)?;
        let completion = build_completion_client(config)?;
        let store = build_vector_store(config).await?;
        let index = DocumentIndex::new(
            embedder,
            store,
            config.embedding_dimension,
            config.retrieval_report_scores,
        );
        Ok(Self::from_parts(index, completion))
    }

    /// Assemble a service from already constructed parts.
    pub fn from_parts(index: DocumentIndex, completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            index,
            completion,
            chunker: TextChunker::default(),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Parse, chunk, and index a document.
    pub async fn upload(
        &self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ProcessingError> {
        tracing::info!(filename = %filename, bytes = bytes.len(), "Processing upload");
        let document = load_upload(filename.clone(), bytes).await?;

        let passages = self.chunker.split_document(&document);
        let total_characters: usize = passages.iter().map(Passage::char_len).sum();
        tracing::debug!(
            filename = %filename,
            segments = document.segments.len(),
            characters = document.char_count(),
            passages = passages.len(),
            "Document chunked"
        );

        let chunks_created = self
            .index
            .ingest(&filename, passages)
            .await
            .map_err(|error| match error {
                IndexError::Superseded { .. } => ProcessingError::Superseded,
                other => ProcessingError::Ingest(other),
            })?;

        self.metrics.record_upload(chunks_created as u64);
        tracing::info!(
            filename = %filename,
            chunks = chunks_created,
            total_characters,
            "Document indexed"
        );

        Ok(UploadOutcome {
            filename,
            chunks_created,
            total_characters,
        })
    }

    /// Retrieve, generate, score, and guard an answer.
    pub async fn ask(&self, question: &str) -> Result<AnswerRecord, ProcessingError> {
        let passages = self
            .index
            .query(question, TOP_K)
            .await
            .map_err(|error| match error {
                IndexError::NoDocument => ProcessingError::NoDocument,
                other => ProcessingError::Retrieval(other),
            })?;

        let guarded = if passages.is_empty() {
            guardrail::no_context()
        } else {
            self.answer_from(&passages, question).await
        };
        self.metrics.record_question(&guarded.outcome);
        tracing::info!(
            guardrail = guarded.outcome.label(),
            confidence = guarded.confidence,
            retrieved = passages.len(),
            "Question answered"
        );

        let GuardedAnswer {
            answer,
            confidence,
            outcome,
        } = guarded;
        Ok(AnswerRecord {
            answer,
            sources: source_previews(&passages),
            confidence: round_confidence(confidence),
            metadata: outcome,
        })
    }

    async fn answer_from(&self, passages: &[ScoredPassage], question: &str) -> GuardedAnswer {
        let answer = match generate_answer(self.completion.as_ref(), passages, question).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(error = %error, "Answer generation failed");
                format!("Error generating answer: {error}")
            }
        };
        let score = confidence::score(passages, &answer, question);
        guardrail::apply(answer, score)
    }

    /// Extract shipment fields, returning the all-null record on any failure.
    pub async fn extract(&self) -> Result<ExtractionRecord, ProcessingError> {
        let outcome = match self.index.dump_all().await {
            Ok(texts) => extract_fields(self.completion.as_ref(), &texts)
                .await
                .map_err(|error| error.to_string()),
            Err(IndexError::NoDocument) => return Err(ProcessingError::NoDocument),
            Err(error) => Err(error.to_string()),
        };

        let record = match outcome {
            Ok(record) => {
                self.metrics.record_extraction(false);
                tracing::info!("Structured fields extracted");
                record
            }
            Err(reason) => {
                self.metrics.record_extraction(true);
                tracing::warn!(reason = %reason, "Extraction fell back to empty record");
                ExtractionRecord::default()
            }
        };
        Ok(record)
    }

    /// Describe the active document.
    pub async fn status(&self) -> IndexStatus {
        self.index.status().await
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(
        &self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ProcessingError> {
        DocumentService::upload(self, filename, bytes).await
    }

    async fn ask(&self, question: &str) -> Result<AnswerRecord, ProcessingError> {
        DocumentService::ask(self, question).await
    }

    async fn extract(&self) -> Result<ExtractionRecord, ProcessingError> {
        DocumentService::extract(self).await
    }

    async fn status(&self) -> IndexStatus {
        DocumentService::status(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}

fn source_previews(passages: &[ScoredPassage]) -> Vec<String> {
    passages
        .iter()
        .take(SOURCE_PREVIEWS)
        .map(|scored| {
            let preview: String = scored
                .passage
                .text
                .chars()
                .take(SOURCE_PREVIEW_CHARS)
                .collect();
            format!("{preview}...")
        })
        .collect()
}

fn round_confidence(confidence: f64) -> f64 {
    (confidence * 1000.0).round() / 1000.0
}
