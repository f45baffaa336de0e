//! HTTP surface for the document Q&A service.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /upload` – Multipart upload (field `file`) of a PDF, Word, or text document. Replaces
//!   the active document and returns `{message, filename, chunks_created, total_characters}`.
//! - `POST /ask` – Answer `{question}` from the active document with sources, a confidence
//!   score, and guardrail metadata.
//! - `POST /extract` – Pull shipment fields from the active document as flat JSON.
//! - `GET /status` – Report whether a document is loaded.
//! - `GET /metrics` – Observe upload, question, and extraction counters.
//! - `GET /` – Static capability listing.
//!
//! Errors are returned as `{"detail": "..."}` with a status derived from the failure.

use crate::loader::LoadError;
use crate::processing::{AnswerRecord, DocumentApi, ExtractionRecord, ProcessingError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload_document::<S>))
        .route("/ask", post(ask_question::<S>))
        .route("/extract", post(extract_fields::<S>))
        .route("/status", get(get_status::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(service)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    filename: String,
    chunks_created: usize,
    total_characters: usize,
}

/// Accept a multipart upload and index it as the active document.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;

        let outcome = service.upload(filename, bytes.to_vec()).await?;
        tracing::info!(
            filename = %outcome.filename,
            chunks = outcome.chunks_created,
            "Upload request completed"
        );
        return Ok(Json(UploadResponse {
            message: "Document uploaded and processed successfully",
            filename: outcome.filename,
            chunks_created: outcome.chunks_created,
            total_characters: outcome.total_characters,
        }));
    }

    Err(AppError::BadRequest("Missing multipart field 'file'".into()))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

/// Answer a question about the active document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AnswerRecord>, AppError>
where
    S: DocumentApi,
{
    Ok(Json(service.ask(&request.question).await?))
}

/// Extract structured shipment fields from the active document.
async fn extract_fields<S>(State(service): State<Arc<S>>) -> Result<Json<ExtractionRecord>, AppError>
where
    S: DocumentApi,
{
    Ok(Json(service.extract().await?))
}

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    document_loaded: bool,
    current_document: Option<String>,
    vector_store_initialized: bool,
}

async fn get_status<S>(State(service): State<Arc<S>>) -> Json<StatusResponse>
where
    S: DocumentApi,
{
    let status = service.status().await;
    Json(StatusResponse {
        status: "online",
        document_loaded: status.current_document.is_some(),
        current_document: status.current_document,
        vector_store_initialized: status.vector_store_initialized,
    })
}

/// Return the service counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Logistics Document Q&A API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /upload - Upload a document",
            "ask": "POST /ask - Ask questions about the document",
            "extract": "POST /extract - Extract structured data",
            "status": "GET /status - Check system status",
            "metrics": "GET /metrics - Service counters"
        }
    }))
}

enum AppError {
    Processing(ProcessingError),
    BadRequest(String),
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            Self::Processing(error) => match error {
                ProcessingError::Load(LoadError::UnsupportedFileType(_)) => {
                    (StatusCode::BAD_REQUEST, error.to_string())
                }
                ProcessingError::Load(inner) => (
                    StatusCode::BAD_REQUEST,
                    format!("Error loading document: {inner}"),
                ),
                ProcessingError::NoDocument => (StatusCode::BAD_REQUEST, error.to_string()),
                ProcessingError::Ingest(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
                }
                ProcessingError::Retrieval(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, error.to_string())
                }
                ProcessingError::Superseded => (StatusCode::CONFLICT, error.to_string()),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            tracing::error!(status = %status, detail = %detail, "Request failed");
        } else {
            tracing::debug!(status = %status, detail = %detail, "Request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::BadRequest(format!("Invalid multipart body: {}", inner.body_text()))
    }
}
