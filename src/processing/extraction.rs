//! Best-effort structured shipment field extraction.

use crate::completion::{CompletionClient, CompletionClientError, CompletionRequest};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Maximum number of document characters placed in the extraction prompt.
pub const EXTRACTION_CONTEXT_CHARS: usize = 4000;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"));

/// Reasons an extraction attempt produced no record.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Model call failed.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Reply was not valid JSON or did not match the record schema.
    #[error("extraction reply is not a valid record: {0}")]
    Parse(#[from] serde_json::Error),
    /// Reply decoded to JSON that is not an object.
    #[error("extraction reply is not a JSON object")]
    NotAnObject,
}

/// Shipment fields pulled from a logistics document; absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRecord {
    /// Shipment or load identifier.
    pub shipment_id: Option<String>,
    /// Shipping party.
    pub shipper: Option<String>,
    /// Receiving party.
    pub consignee: Option<String>,
    /// Pickup date and time.
    pub pickup_datetime: Option<String>,
    /// Delivery date and time.
    pub delivery_datetime: Option<String>,
    /// Trailer or equipment type.
    pub equipment_type: Option<String>,
    /// Transport mode.
    pub mode: Option<String>,
    /// Agreed rate.
    pub rate: Option<String>,
    /// Currency of the rate.
    pub currency: Option<String>,
    /// Shipment weight.
    pub weight: Option<String>,
    /// Carrier name.
    pub carrier_name: Option<String>,
}

/// Join stored passages with single spaces and keep the first 4000 characters.
pub fn extraction_context(passages: &[String]) -> String {
    passages
        .join(" ")
        .chars()
        .take(EXTRACTION_CONTEXT_CHARS)
        .collect()
}

/// Build the instruction demanding the 11 fields as bare JSON.
pub fn build_extraction_prompt(document_text: &str) -> String {
    format!(
        r#"Extract the following shipment information from this logistics document. Return ONLY valid JSON with these exact fields. Use null for missing information.

Document text:
{document_text}

Required JSON format:
{{
    "shipment_id": "string or null",
    "shipper": "string or null",
    "consignee": "string or null",
    "pickup_datetime": "string or null",
    "delivery_datetime": "string or null",
    "equipment_type": "string or null",
    "mode": "string or null",
    "rate": "string or null",
    "currency": "string or null",
    "weight": "string or null",
    "carrier_name": "string or null"
}}

Return ONLY the JSON, no other text:"#
    )
}

/// Decode a model reply into a record.
///
/// The widest `{...}` span is decoded when present, otherwise the whole reply. Unknown keys
/// are ignored; a non-string value for a known field is an error, as is any top-level value
/// other than an object.
pub fn parse_extraction(reply: &str) -> Result<ExtractionRecord, ExtractionError> {
    let candidate = JSON_OBJECT
        .find(reply)
        .map_or(reply, |found| found.as_str());
    match serde_json::from_str::<serde_json::Value>(candidate)? {
        object @ serde_json::Value::Object(_) => Ok(serde_json::from_value(object)?),
        _ => Err(ExtractionError::NotAnObject),
    }
}

/// Run one extraction over the stored passages.
pub async fn extract_fields(
    client: &dyn CompletionClient,
    passages: &[String],
) -> Result<ExtractionRecord, ExtractionError> {
    let prompt = build_extraction_prompt(&extraction_context(passages));
    let reply = client.complete(CompletionRequest::deterministic(prompt)).await?;
    parse_extraction(&reply)
}
