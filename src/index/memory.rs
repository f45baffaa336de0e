//! In-process vector store using cosine similarity.

use super::{EmbeddedPassage, IndexError, PassageCollection, VectorStore};
use crate::processing::ScoredPassage;
use async_trait::async_trait;
use std::{cmp::Ordering, sync::Arc};

/// Vector store that keeps every collection in memory.
///
/// Collections are immutable once built; replacing the document builds a new one.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore;

impl InMemoryVectorStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self
    }
}

struct InMemoryCollection {
    entries: Vec<EmbeddedPassage>,
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(
        &self,
        generation: u64,
        passages: Vec<EmbeddedPassage>,
    ) -> Result<Arc<dyn PassageCollection>, IndexError> {
        tracing::debug!(generation, passages = passages.len(), "Built in-memory collection");
        Ok(Arc::new(InMemoryCollection { entries: passages }))
    }
}

#[async_trait]
impl PassageCollection for InMemoryCollection {
    fn len(&self) -> usize {
        self.entries.len()
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>, IndexError> {
        let mut scored: Vec<ScoredPassage> = self
            .entries
            .iter()
            .map(|entry| ScoredPassage {
                passage: entry.passage.clone(),
                score: Some(cosine_similarity(&entry.vector, vector)),
            })
            .collect();

        // Stable sort keeps document order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn dump_all(&self) -> Result<Vec<String>, IndexError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.passage.text.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Passage;

    fn entry(position: usize, text: &str, vector: Vec<f32>) -> EmbeddedPassage {
        EmbeddedPassage {
            passage: Passage {
                document: "doc.txt".into(),
                segment: 0,
                position,
                start: 0,
                end: text.len(),
                text: text.into(),
            },
            vector,
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_returns_best_first_and_respects_k() {
        let collection = InMemoryVectorStore::new()
            .create_collection(
                1,
                vec![
                    entry(0, "a", vec![1.0, 0.0]),
                    entry(1, "b", vec![0.0, 1.0]),
                    entry(2, "c", vec![0.7, 0.7]),
                ],
            )
            .await
            .expect("collection");

        let results = collection.query(&[0.0, 1.0], 2).await.expect("query");
        let texts: Vec<&str> = results.iter().map(|r| r.passage.text.as_str()).collect();
        assert_eq!(texts, ["b", "c"]);
        assert!(results[0].score.unwrap_or_default() > results[1].score.unwrap_or_default());
    }

    #[tokio::test]
    async fn dump_all_preserves_insertion_order() {
        let collection = InMemoryVectorStore::new()
            .create_collection(
                1,
                vec![entry(0, "first", vec![1.0]), entry(1, "second", vec![1.0])],
            )
            .await
            .expect("collection");

        assert_eq!(collection.len(), 2);
        assert_eq!(
            collection.dump_all().await.expect("dump"),
            vec!["first".to_string(), "second".to_string()]
        );
    }
}
