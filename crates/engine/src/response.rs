//! Raw backend results to plain summary text.

use decentra_core::{BackendError, FragmentStream, RawResponse};
use serde_json::Value;
use tracing::warn;

/// Extract the completion text from a raw backend result.
///
/// Text passes through unchanged. Structured results yield
/// `choices[0].message.content`; any other shape degrades to its compact
/// JSON rendering.
pub fn normalize_response(raw: &RawResponse) -> String {
    match raw {
        RawResponse::Text(text) => text.clone(),
        RawResponse::Structured(Value::String(text)) => text.clone(),
        RawResponse::Structured(value) => {
            match value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
            {
                Some(content) => content.to_string(),
                None => {
                    warn!("Unexpected model response shape, using its JSON rendering");
                    value.to_string()
                }
            }
        }
    }
}

/// Drain a fragment stream into a single string.
///
/// Stops at the first fragment marked `done`; an in-band error aborts.
pub async fn collect_stream(mut stream: FragmentStream) -> Result<String, BackendError> {
    let mut text = String::new();
    while let Some(fragment) = stream.recv().await {
        let fragment = fragment?;
        if let Some(content) = fragment.content {
            text.push_str(&content);
        }
        if fragment.done {
            break;
        }
    }
    Ok(text)
}
