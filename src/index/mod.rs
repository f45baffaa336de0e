//! Generation-swapped passage index shared by every request handler.
//!
//! An upload embeds its passages into a brand new collection and only then swaps it in under a
//! short write lock. Readers clone the active `Arc` and work against that snapshot, so they
//! observe either the previous document or the new one, never a partially populated index.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;

use crate::{
    config::{Config, VectorStoreKind},
    embedding::{EmbeddingClient, EmbeddingClientError},
    processing::{IndexStatus, Passage, ScoredPassage},
    qdrant::{QdrantError, QdrantService},
};
use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tokio::sync::RwLock;

/// Number of passages retrieved per question.
pub const TOP_K: usize = 4;

/// Errors raised by the passage index and its storage backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No collection has been activated yet.
    #[error("no document has been indexed")]
    NoDocument,
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant backend failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Provider returned vectors of the wrong size.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension returned by the provider.
        actual: usize,
    },
    /// Stored payload could not be decoded into a passage.
    #[error("stored passage payload is invalid: {0}")]
    CorruptPayload(String),
    /// A newer upload finished first; this one was discarded.
    #[error("upload superseded by a newer document (generation {generation})")]
    Superseded {
        /// Generation of the discarded upload.
        generation: u64,
    },
}

/// Passage paired with its embedding, ready to be stored.
#[derive(Debug, Clone)]
pub struct EmbeddedPassage {
    /// Passage metadata and text.
    pub passage: Passage,
    /// Embedding of `passage.text`.
    pub vector: Vec<f32>,
}

/// Backend able to materialize a fully populated collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store `passages` in a fresh collection for `generation` and return a handle to it.
    ///
    /// Dropping the returned handle releases any backend resources held by the collection.
    async fn create_collection(
        &self,
        generation: u64,
        passages: Vec<EmbeddedPassage>,
    ) -> Result<Arc<dyn PassageCollection>, IndexError>;
}

/// Read access to one populated collection.
#[async_trait]
pub trait PassageCollection: Send + Sync {
    /// Number of stored passages.
    fn len(&self) -> usize;

    /// Whether the collection holds no passages.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` passages nearest to `vector`, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>, IndexError>;

    /// Return every stored passage text in insertion order.
    async fn dump_all(&self) -> Result<Vec<String>, IndexError>;
}

struct ActiveCollection {
    generation: u64,
    document: String,
    collection: Arc<dyn PassageCollection>,
}

/// Handle to the single active document collection.
pub struct DocumentIndex {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    dimension: usize,
    report_scores: bool,
    active: RwLock<Option<Arc<ActiveCollection>>>,
    generations: AtomicU64,
}

impl DocumentIndex {
    /// Create an empty index.
    ///
    /// When `report_scores` is false, similarity scores are withheld from callers so the
    /// confidence scorer falls back to its default retrieval quality.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        dimension: usize,
        report_scores: bool,
    ) -> Self {
        Self {
            embedder,
            store,
            dimension,
            report_scores,
            active: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Embed `passages` into a new collection and make it the active one.
    ///
    /// Returns the number of stored passages. If a later upload has already been activated,
    /// the new collection is discarded and [`IndexError::Superseded`] is returned.
    pub async fn ingest(&self, document: &str, passages: Vec<Passage>) -> Result<usize, IndexError> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(document, generation, passages = passages.len(), "Embedding passages");

        let texts: Vec<String> = passages.iter().map(|passage| passage.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.generate_embeddings(texts).await?
        };
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let embedded: Vec<EmbeddedPassage> = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| EmbeddedPassage { passage, vector })
            .collect();
        let collection = self.store.create_collection(generation, embedded).await?;
        let stored = collection.len();

        let mut active = self.active.write().await;
        if let Some(current) = active.as_ref()
            && current.generation > generation
        {
            tracing::warn!(
                document,
                generation,
                active_generation = current.generation,
                "Discarding superseded upload"
            );
            return Err(IndexError::Superseded { generation });
        }
        *active = Some(Arc::new(ActiveCollection {
            generation,
            document: document.to_string(),
            collection,
        }));
        drop(active);

        tracing::info!(document, generation, passages = stored, "Activated collection");
        Ok(stored)
    }

    /// Retrieve up to `k` passages for `question`, best first.
    pub async fn query(&self, question: &str, k: usize) -> Result<Vec<ScoredPassage>, IndexError> {
        let active = self.snapshot().await?;

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for question".into())
        })?;
        self.check_dimension(&vector)?;

        let mut results = active.collection.query(&vector, k).await?;
        if !self.report_scores {
            for result in &mut results {
                result.score = None;
            }
        }
        tracing::debug!(
            generation = active.generation,
            retrieved = results.len(),
            "Retrieved passages"
        );
        Ok(results)
    }

    /// Every passage text of the active collection, in document order.
    pub async fn dump_all(&self) -> Result<Vec<String>, IndexError> {
        let active = self.snapshot().await?;
        active.collection.dump_all().await
    }

    /// Report the active document, if any.
    pub async fn status(&self) -> IndexStatus {
        match self.active.read().await.as_ref() {
            Some(active) => IndexStatus {
                current_document: Some(active.document.clone()),
                vector_store_initialized: !active.collection.is_empty(),
            },
            None => IndexStatus::default(),
        }
    }

    async fn snapshot(&self) -> Result<Arc<ActiveCollection>, IndexError> {
        self.active
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(IndexError::NoDocument)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

/// Build the vector store selected by `config`.
///
/// The Qdrant backend removes collections left behind by earlier runs before returning.
pub async fn build_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, IndexError> {
    match config.vector_store {
        VectorStoreKind::Memory => {
            tracing::info!("Using in-memory vector store");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
        VectorStoreKind::Qdrant => {
            tracing::info!(url = %config.qdrant_url, "Using Qdrant vector store");
            let service = QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())?;
            let store = QdrantVectorStore::connect(
                Arc::new(service),
                config.qdrant_collection_prefix.clone(),
                config.embedding_dimension,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}
