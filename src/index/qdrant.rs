//! Qdrant-backed vector store with one collection per upload generation.

use super::{EmbeddedPassage, IndexError, PassageCollection, VectorStore};
use crate::{
    processing::ScoredPassage,
    qdrant::{
        PassagePayload, PointInsert, QdrantService,
        payload::{current_timestamp_rfc3339, generate_point_id},
        scroller::stream_payloads,
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut};
use std::sync::Arc;

/// Vector store writing each generation to its own `<prefix>_<generation>` collection.
pub struct QdrantVectorStore {
    service: Arc<QdrantService>,
    prefix: String,
    dimension: usize,
}

impl QdrantVectorStore {
    /// Connect to Qdrant and delete collections left over from previous runs.
    pub async fn connect(
        service: Arc<QdrantService>,
        prefix: String,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        let stale_prefix = format!("{prefix}_");
        let stale: Vec<String> = service
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&stale_prefix))
            .collect();
        for name in &stale {
            service.delete_collection(name).await?;
        }
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), prefix = %prefix, "Removed stale collections");
        }

        Ok(Self {
            service,
            prefix,
            dimension,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(
        &self,
        generation: u64,
        passages: Vec<EmbeddedPassage>,
    ) -> Result<Arc<dyn PassageCollection>, IndexError> {
        let name = format!("{}_{generation}", self.prefix);
        self.service
            .create_collection(&name, self.dimension as u64)
            .await?;

        // Constructed before the upsert so a failed write still removes the collection.
        let collection = QdrantCollection {
            service: Arc::clone(&self.service),
            name,
            len: passages.len(),
        };

        let indexed_at = current_timestamp_rfc3339();
        let points = passages
            .into_iter()
            .map(|EmbeddedPassage { passage, vector }| {
                let payload = serde_json::to_value(PassagePayload::from_passage(
                    &passage,
                    &indexed_at,
                ))
                .map_err(|err| IndexError::CorruptPayload(err.to_string()))?;
                Ok(PointInsert {
                    id: generate_point_id(),
                    vector,
                    payload,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        self.service
            .upsert_points(&collection.name, points)
            .await?;
        tracing::debug!(collection = %collection.name, points = collection.len, "Qdrant collection ready");
        Ok(Arc::new(collection))
    }
}

struct QdrantCollection {
    service: Arc<QdrantService>,
    name: String,
    len: usize,
}

#[async_trait]
impl PassageCollection for QdrantCollection {
    fn len(&self) -> usize {
        self.len
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>, IndexError> {
        let points = self
            .service
            .search_points(&self.name, vector.to_vec(), k)
            .await?;

        points
            .into_iter()
            .map(|point| {
                let payload = point.payload.ok_or_else(|| {
                    IndexError::CorruptPayload(format!("point {} has no payload", point.id))
                })?;
                let passage = PassagePayload::from_map(payload)
                    .map_err(|err| IndexError::CorruptPayload(err.to_string()))?
                    .into_passage();
                Ok(ScoredPassage {
                    passage,
                    score: Some(point.score),
                })
            })
            .collect()
    }

    async fn dump_all(&self) -> Result<Vec<String>, IndexError> {
        let stream = stream_payloads(&self.service, &self.name);
        pin_mut!(stream);

        let mut payloads = Vec::with_capacity(self.len);
        while let Some(item) = stream.next().await {
            let payload = PassagePayload::from_map(item?)
                .map_err(|err| IndexError::CorruptPayload(err.to_string()))?;
            payloads.push(payload);
        }
        payloads.sort_by_key(|payload| payload.position);

        Ok(payloads.into_iter().map(|payload| payload.text).collect())
    }
}

impl Drop for QdrantCollection {
    fn drop(&mut self) {
        let name = std::mem::take(&mut self.name);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(collection = %name, "No runtime available to delete collection");
            return;
        };
        let service = Arc::clone(&self.service);
        handle.spawn(async move {
            match service.delete_collection(&name).await {
                Ok(()) => tracing::debug!(collection = %name, "Retired collection deleted"),
                Err(error) => {
                    tracing::warn!(collection = %name, error = %error, "Failed to delete retired collection");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Passage;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;
    use std::time::Duration;

    fn embedded(position: usize, text: &str) -> EmbeddedPassage {
        EmbeddedPassage {
            passage: Passage {
                document: "bol.pdf".into(),
                segment: 0,
                position,
                start: position * 10,
                end: position * 10 + text.len(),
                text: text.into(),
            },
            vector: vec![0.5, 0.5],
        }
    }

    fn payload(position: usize, text: &str) -> serde_json::Value {
        json!({
            "document": "bol.pdf",
            "segment": 0,
            "position": position,
            "start": position * 10,
            "end": position * 10 + text.len(),
            "text": text,
            "chunk_hash": "h",
            "indexed_at": "2025-01-01T00:00:00Z"
        })
    }

    async fn store(server: &MockServer) -> QdrantVectorStore {
        let service = Arc::new(QdrantService::new(&server.base_url(), None).expect("service"));
        QdrantVectorStore::connect(service, "docs".into(), 2)
            .await
            .expect("connect")
    }

    #[tokio::test]
    async fn connect_removes_stale_generations() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [ { "name": "docs_3" }, { "name": "other" } ] }
                }));
            })
            .await;
        let stale = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs_3");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let untouched = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/other");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        store(&server).await;

        stale.assert();
        assert_eq!(untouched.hits(), 0);
    }

    #[tokio::test]
    async fn collection_round_trip_and_cleanup() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200)
                    .json_body(json!({ "result": { "collections": [] } }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs_1")
                    .body_contains("\"size\":2");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs_1/points")
                    .body_contains("Consignee");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs_1/points/query");
                then.status(200).json_body(json!({
                    "result": { "points": [
                        { "id": "a", "score": 0.91, "payload": payload(1, "Consignee: Beta") }
                    ] }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs_1/points/scroll");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "a", "payload": payload(1, "Consignee: Beta") },
                            { "id": "b", "payload": payload(0, "Shipper: Acme") }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs_1");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let store = store(&server).await;
        let collection = store
            .create_collection(
                1,
                vec![embedded(0, "Shipper: Acme"), embedded(1, "Consignee: Beta")],
            )
            .await
            .expect("create");
        create.assert();
        upsert.assert();
        assert_eq!(collection.len(), 2);

        let hits = collection.query(&[0.5, 0.5], 4).await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.position, 1);
        assert_eq!(hits[0].score, Some(0.91));

        let texts = collection.dump_all().await.expect("dump");
        assert_eq!(texts, vec!["Shipper: Acme", "Consignee: Beta"]);

        drop(collection);
        for _ in 0..100 {
            if delete.hits_async().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn failed_upsert_still_deletes_collection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200)
                    .json_body(json!({ "result": { "collections": [] } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs_7");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs_7/points");
                then.status(500).body("disk full");
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs_7");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let store = store(&server).await;
        let outcome = store.create_collection(7, vec![embedded(0, "x")]).await;
        assert!(matches!(outcome, Err(IndexError::Qdrant(_))));

        for _ in 0..100 {
            if delete.hits_async().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        delete.assert_async().await;
    }
}
