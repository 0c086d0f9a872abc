//! Gmail API v1: fetch recent messages.
//!
//! Lists messages matching `after:{unix}` (plus `is:unread` when asked),
//! then fetches each one with `format=full` to pull headers, the snippet
//! and the first `text/plain` body. Individual message fetch failures are
//! skipped.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use decentra_core::source::EMAIL_SOURCE;
use decentra_core::{AdapterError, ContentRecord, ContentSource, FetchFilter, FetchRequest};
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

// ============================================================================
// Source
// ============================================================================

/// Gmail mailbox source.
pub struct GmailSource {
    access_token: String,
    max_results: u32,
    base_url: String,
    client: reqwest::Client,
}

impl GmailSource {
    pub fn new(access_token: impl Into<String>, max_results: u32) -> Self {
        Self {
            access_token: access_token.into(),
            max_results: max_results.max(1),
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the source at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_failed(reason: impl Into<String>) -> AdapterError {
        AdapterError::RequestFailed {
            source_name: EMAIL_SOURCE.into(),
            reason: reason.into(),
        }
    }

    /// List message ids matching `query`, following pages up to the cap.
    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = self.max_results as usize - ids.len();
            let mut params: Vec<(&str, String)> = vec![
                ("q", query.to_string()),
                ("maxResults", remaining.to_string()),
            ];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await
                .map_err(|e| Self::request_failed(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::request_failed(format!(
                    "message list returned {status}: {body}"
                )));
            }

            let list: MessageListResponse =
                resp.json().await.map_err(|e| AdapterError::InvalidPayload {
                    source_name: EMAIL_SOURCE.into(),
                    reason: e.to_string(),
                })?;

            ids.extend(list.messages.into_iter().map(|m| m.id));
            ids.truncate(self.max_results as usize);

            match list.next_page_token {
                Some(token) if ids.len() < self.max_results as usize => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn fetch_message(&self, message_id: &str) -> Result<ContentRecord, AdapterError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, message_id);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| Self::request_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::request_failed(format!(
                "message fetch returned {}",
                resp.status()
            )));
        }

        let detail: MessageDetail = resp.json().await.map_err(|e| AdapterError::InvalidPayload {
            source_name: EMAIL_SOURCE.into(),
            reason: e.to_string(),
        })?;

        Ok(to_record(detail))
    }
}

#[async_trait]
impl ContentSource for GmailSource {
    fn name(&self) -> &str {
        EMAIL_SOURCE
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<ContentRecord>, AdapterError> {
        let FetchFilter::Mailbox { unread_only } = request.filter else {
            return Err(AdapterError::UnsupportedFilter(EMAIL_SOURCE.into()));
        };

        let query = build_query(request.since, unread_only);
        let ids = self.list_message_ids(&query).await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.fetch_message(id).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!(message_id = %id, error = %e, "Skipping message");
                    continue;
                }
            }
        }

        info!(query = %query, listed = ids.len(), fetched = records.len(), "Fetched Gmail messages");
        Ok(records)
    }
}

/// Gmail search query for messages received at or after `since`.
fn build_query(since: DateTime<Utc>, unread_only: bool) -> String {
    let mut query = format!("after:{}", since.timestamp());
    if unread_only {
        query.push_str(" is:unread");
    }
    query
}

fn to_record(detail: MessageDetail) -> ContentRecord {
    let headers = detail
        .payload
        .as_ref()
        .map(|p| &p.headers[..])
        .unwrap_or(&[]);

    let get_header = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let mut record = ContentRecord::new(detail.id)
        .with_author(get_header("From").unwrap_or_default())
        .with_snippet(detail.snippet);

    if let Some(subject) = get_header("Subject") {
        record = record.with_subject(subject);
    }

    if let Some(ts) = detail
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
    {
        record = record.with_timestamp(ts);
    }

    if let Some(body) = detail
        .payload
        .as_ref()
        .and_then(|p| extract_body_text(p, "text/plain"))
    {
        record = record.with_body(body);
    }

    record
}

/// Recursively walk MIME parts to find body data matching the target MIME type.
fn extract_body_text(payload: &MessagePayload, target_mime: &str) -> Option<String> {
    if payload.mime_type == target_mime {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_url_safe_base64(data);
        }
    }
    payload
        .parts
        .iter()
        .find_map(|part| extract_body_text(part, target_mime))
}

/// Decode URL-safe base64 as used by the Gmail API (padding optional).
fn decode_url_safe_base64(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn query_includes_unread_flag() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(build_query(since, true), "after:1714521600 is:unread");
        assert_eq!(build_query(since, false), "after:1714521600");
    }

    #[test]
    fn record_from_multipart_message() {
        let json = serde_json::json!({
            "id": "18f",
            "snippet": "Can we move the review",
            "internalDate": "1714557600000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "From", "value": "Ana <ana@example.com>"},
                    {"name": "subject", "value": "Review"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>html</p>")}},
                    {"mimeType": "text/plain", "body": {"data": encode("Can we move the review to Friday?")}}
                ]
            }
        });
        let detail: MessageDetail = serde_json::from_value(json).unwrap();
        let record = to_record(detail);

        assert_eq!(record.id, "18f");
        assert_eq!(record.author, "Ana <ana@example.com>");
        assert_eq!(record.subject.as_deref(), Some("Review"));
        assert_eq!(record.body, "Can we move the review to Friday?");
        assert_eq!(
            record.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn html_only_message_keeps_snippet() {
        let json = serde_json::json!({
            "id": "x",
            "snippet": "Newsletter",
            "payload": {
                "mimeType": "text/html",
                "body": {"data": encode("<b>hi</b>")}
            }
        });
        let record = to_record(serde_json::from_value(json).unwrap());
        assert!(!record.has_body());
        assert!(record.subject.is_none());
        assert_eq!(record.snippet, "Newsletter");
    }

    #[test]
    fn decode_accepts_padding() {
        assert_eq!(decode_url_safe_base64("aGk=").as_deref(), Some("hi"));
        assert_eq!(decode_url_safe_base64("aGk").as_deref(), Some("hi"));
        assert!(decode_url_safe_base64("!!!").is_none());
    }

    #[tokio::test]
    async fn rejects_account_filter() {
        let source = GmailSource::new("token", 10);
        let request = FetchRequest {
            since: Utc::now(),
            filter: FetchFilter::Accounts {
                handles: vec!["a".into()],
                max_results: 1,
            },
        };
        assert!(matches!(
            source.fetch(&request).await,
            Err(AdapterError::UnsupportedFilter(_))
        ));
    }
}
