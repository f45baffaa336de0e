//! End-to-end checks through the router with the real service, the local embedder, the
//! in-memory index, and a scripted language model.

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{
    api::create_router,
    completion::{CompletionClient, CompletionClientError, CompletionRequest},
    embedding::HashingEmbeddingClient,
    index::{DocumentIndex, InMemoryVectorStore},
    processing::DocumentService,
};
use serde_json::{Value, json};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

const DIM: usize = 256;
const BOUNDARY: &str = "pipeline-boundary";

/// Replays canned replies and records every prompt it receives.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, CompletionClientError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn with(replies: Vec<Result<String, CompletionClientError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError> {
        assert_eq!(request.temperature, 0.0);
        self.prompts.lock().expect("lock").push(request.prompt);
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(CompletionClientError::GenerationFailed("no reply".into())))
    }
}

fn app(model: Arc<ScriptedModel>) -> Router {
    let index = DocumentIndex::new(
        Arc::new(HashingEmbeddingClient::new(DIM)),
        Arc::new(InMemoryVectorStore::new()),
        DIM,
        false,
    );
    create_router(Arc::new(DocumentService::from_parts(index, model)))
}

fn upload(filename: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn rate_confirmation() -> String {
    let mut text = String::from("RATE CONFIRMATION\n\nLoad Number: LD-55821\n\n");
    text.push_str("Shipper: Acme Freight Corp, 100 Industrial Way, Dallas TX\n\n");
    text.push_str("Consignee: Beta Logistics LLC, 9 Harbor Road, Denver CO\n\n");
    text.push_str("Equipment: 53ft Dry Van. Mode: FTL.\n\n");
    text.push_str("Agreed rate: 2450.00 USD all-in, payable within 30 days.\n\n");
    for clause in 1..=12 {
        text.push_str(&format!(
            "Clause {clause}. The carrier shall comply with all applicable regulations, \
             maintain cargo insurance, and notify the broker of any delay exceeding two hours.\n\n"
        ));
    }
    text
}

#[tokio::test]
async fn ask_and_extract_require_a_document() {
    let app = app(ScriptedModel::with(vec![]));

    let (status, body) = send(&app, post_json("/ask", json!({ "question": "rate?" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "No document uploaded. Please upload a document first."
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/extract")
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_and_empty_uploads_are_rejected() {
    let app = app(ScriptedModel::with(vec![]));

    let (status, body) = send(&app, upload("rates.csv", "a,b,c")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.starts_with("File type not supported."))
    );

    let (status, body) = send(&app, upload("blank.txt", "   \n\n  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.starts_with("Error loading document:"))
    );

    let (_, status_body) = send(
        &app,
        Request::builder()
            .uri("/status")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status_body["document_loaded"], false);
}

#[tokio::test]
async fn upload_ask_extract_round_trip() {
    let model = ScriptedModel::with(vec![
        Ok("The agreed rate is 2450.00 USD all-in for load LD-55821.".into()),
        Ok("Here you go:\n{\"shipment_id\": \"LD-55821\", \"rate\": \"2450.00\", \
            \"currency\": \"USD\", \"weight\": null, \"notes\": \"ignored\"}"
            .into()),
    ]);
    let app = app(model.clone());
    let document = rate_confirmation();

    let (status, body) = send(&app, upload("confirmation.txt", &document)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "confirmation.txt");
    let chunks = body["chunks_created"].as_u64().expect("chunk count");
    assert!(chunks > 1, "multi-paragraph document should span several passages");
    assert!(body["total_characters"].as_u64().expect("characters") >= document.len() as u64);

    let (status, body) = send(
        &app,
        post_json("/ask", json!({ "question": "What is the agreed rate?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["guardrail"], "passed");
    assert_eq!(
        body["answer"],
        "The agreed rate is 2450.00 USD all-in for load LD-55821."
    );
    let sources = body["sources"].as_array().expect("sources");
    assert!(!sources.is_empty() && sources.len() <= 3);
    assert!(
        sources
            .iter()
            .all(|source| source.as_str().is_some_and(|s| s.ends_with("...")
                && s.chars().count() <= 203))
    );
    let confidence = body["confidence"].as_f64().expect("confidence");
    assert!((0.3..=1.0).contains(&confidence));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/extract")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shipment_id"], "LD-55821");
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["weight"], Value::Null);
    assert!(body.get("notes").is_none());

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Question: What is the agreed rate?"));
    assert!(prompts[1].contains("Document text:\nRATE CONFIRMATION"));

    let (_, status_body) = send(
        &app,
        Request::builder()
            .uri("/status")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status_body["current_document"], "confirmation.txt");
    assert_eq!(status_body["vector_store_initialized"], true);

    let (_, metrics) = send(
        &app,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(metrics["documents_uploaded"], 1);
    assert_eq!(metrics["passages_indexed"], chunks);
    assert_eq!(metrics["questions_passed"], 1);
    assert_eq!(metrics["extractions"], 1);
}

#[tokio::test]
async fn failing_model_degrades_instead_of_erroring() {
    let model = ScriptedModel::with(vec![
        Err(CompletionClientError::ProviderUnavailable("rate limited".into())),
        Ok("I cannot extract this".into()),
    ]);
    let app = app(model);

    let (status, _) = send(&app, upload("bol.txt", "Shipper: Acme. Consignee: Beta.")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, post_json("/ask", json!({ "question": "Who ships?" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["answer"]
            .as_str()
            .is_some_and(|answer| answer.contains("Error generating answer:"))
    );
    assert_eq!(body["sources"].as_array().map(Vec::len), Some(1));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/extract")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let fields = body.as_object().expect("object");
    assert_eq!(fields.len(), 11);
    assert!(fields.values().all(Value::is_null));
}

#[tokio::test]
async fn model_error_during_extraction_returns_empty_record() {
    let model = ScriptedModel::with(vec![Err(CompletionClientError::ProviderUnavailable(
        "connection refused".into(),
    ))]);
    let app = app(model.clone());

    let (status, _) = send(&app, upload("rc.txt", "Load LD-1. Rate: 900 USD.")).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/extract")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let fields = body.as_object().expect("object");
    assert_eq!(fields.len(), 11);
    assert!(fields.values().all(Value::is_null));
    assert_eq!(model.prompts().len(), 1);

    let (_, metrics) = send(
        &app,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(metrics["extractions"], 1);
    assert_eq!(metrics["extraction_fallbacks"], 1);
}

#[tokio::test]
async fn second_upload_replaces_first() {
    let model = ScriptedModel::with(vec![Ok(
        "The carrier is Gamma Trucking Inc per the document.".into(),
    )]);
    let app = app(model.clone());

    send(&app, upload("first.txt", "Shipper: Acme Freight Corp")).await;
    let (status, _) = send(&app, upload("second.txt", "Carrier: Gamma Trucking Inc")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, post_json("/ask", json!({ "question": "Who is the carrier?" }))).await;
    assert_eq!(
        body["sources"],
        json!(["Carrier: Gamma Trucking Inc..."])
    );
    assert!(!model.prompts()[0].contains("Acme"));
}
