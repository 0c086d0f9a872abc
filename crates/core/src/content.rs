//! Retrieved content records.
//!
//! A [`ContentRecord`] is one item (email, post) as returned by a retrieval
//! adapter. Records are immutable once built and are folded into prompt
//! chunks by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One retrieved item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Source-specific identifier
    pub id: String,

    /// When the item was created at the origin, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Sender address or author handle
    #[serde(default)]
    pub author: String,

    /// Subject line (mail only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Full text body; may be empty
    #[serde(default)]
    pub body: String,

    /// Short preview used when the body is unavailable
    #[serde(default)]
    pub snippet: String,
}

impl ContentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            author: String::new(),
            subject: None,
            body: String::new(),
            snippet: String::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    /// Whether the record carries a non-blank body.
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// Order records newest first; undated records go last and ties keep their
/// relative order.
pub fn sort_newest_first(records: &mut [ContentRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Parse a caller-supplied `since` timestamp.
///
/// Only RFC 3339 timestamps with an explicit offset are accepted; a naive
/// timestamp like `2024-05-01T10:00:00` is rejected rather than guessed.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(_) if trimmed.parse::<chrono::NaiveDateTime>().is_ok() => {
            Err(Error::InvalidArgument(format!(
                "timestamp '{trimmed}' has no timezone offset; use RFC 3339 (e.g. {trimmed}Z)"
            )))
        }
        Err(e) => Err(Error::InvalidArgument(format!(
            "invalid timestamp '{trimmed}': {e}"
        ))),
    }
}
