//! Paginated reads over the Qdrant scroll endpoint, exposed as a stream.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};

use super::client::QdrantService;
use super::types::{QdrantError, ScrollResponse};

const PAGE_SIZE: usize = 256;

#[derive(Serialize)]
struct ScrollRequest {
    with_payload: bool,
    with_vector: bool,
    limit: usize,
    offset: Option<Value>,
}

/// Stream every payload stored in `collection`, one page request at a time.
///
/// Points without a payload are skipped. Order follows Qdrant's point id order, so callers
/// that need document order must sort on a payload field.
pub fn stream_payloads<'a>(
    service: &'a QdrantService,
    collection: &'a str,
) -> impl Stream<Item = Result<Map<String, Value>, QdrantError>> + 'a {
    try_stream! {
        let mut request = ScrollRequest {
            with_payload: true,
            with_vector: false,
            limit: PAGE_SIZE,
            offset: None,
        };
        let mut pages = 0_usize;

        loop {
            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                pages += 1;
                for payload in result.points.into_iter().filter_map(|point| point.payload) {
                    yield payload;
                }

                match result.next_page_offset {
                    Some(next) => request.offset = Some(next),
                    None => {
                        tracing::debug!(collection, pages, "Scroll complete");
                        break;
                    }
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection, status = %status, pages, "Scroll request failed");
                Err(QdrantError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
