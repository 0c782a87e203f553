use serde_json::Value;
use tracing::{info, warn};

use crate::documents::models::{DocumentType, ExtractedProfile};
use crate::documents::prompts::{
    build_extraction_prompt, FALLBACK_SUMMARY_CHARS, MAX_DOCUMENT_CHARS,
};
use crate::llm_client::prompts::{truncate_chars, JSON_ONLY_SYSTEM};
use crate::llm_client::{parse_json_reply, LlmError, TextGenerator};

/// Sends document text to the model and parses the reply into the fixed profile schema.
///
/// A reply that is not valid JSON is not an error: the profile then carries the leading
/// part of the document as its summary, so the knowledge base still gets something usable.
/// Transport and API failures propagate.
pub async fn extract_document_information(
    llm: &dyn TextGenerator,
    text: &str,
    document_type: DocumentType,
) -> Result<ExtractedProfile, LlmError> {
    let prompt = build_extraction_prompt(
        document_type.as_str(),
        truncate_chars(text, MAX_DOCUMENT_CHARS),
    );
    let reply = llm.generate(&prompt, JSON_ONLY_SYSTEM).await?;

    match parse_profile(&reply) {
        Ok(profile) => {
            info!("Extracted information from {}", document_type);
            Ok(profile)
        }
        Err(e) => {
            warn!("Unusable extraction reply ({e}); keeping plain-text summary");
            Ok(fallback_profile(text))
        }
    }
}

/// Only a JSON object maps onto the profile. Arrays would otherwise fill fields by position.
fn parse_profile(reply: &str) -> Result<ExtractedProfile, String> {
    match parse_json_reply::<Value>(reply).map_err(|e| e.to_string())? {
        Value::Object(map) => {
            serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
        }
        other => Err(format!("expected a JSON object, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn fallback_profile(text: &str) -> ExtractedProfile {
    let summary = truncate_chars(text.trim(), FALLBACK_SUMMARY_CHARS).trim();
    ExtractedProfile {
        summary: (!summary.is_empty()).then(|| summary.to_string()),
        ..Default::default()
    }
}
