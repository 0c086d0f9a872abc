//! Content records to plain-text prompt chunks.
//!
//! No record is ever dropped: a record without a body falls back to its
//! subject and snippet (mail) or snippet and a placeholder (posts).

use chrono::SecondsFormat;
use decentra_core::ContentRecord;

pub use decentra_core::sort_newest_first;

/// User-message text when there is nothing to summarize.
pub const NO_CONTENT_PLACEHOLDER: &str = "No text found.";

/// Separator between chunks in the user message.
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// One chunk per mail record: the body verbatim, else subject and snippet.
pub fn email_chunks(records: &[ContentRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            if record.has_body() {
                return record.body.clone();
            }
            let subject = record
                .subject
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("(no subject)");
            format!("Subject: {subject}\nSnippet: {}", record.snippet)
        })
        .collect()
}

/// One chunk per post: `@{author} ({timestamp}):\n{text}`.
pub fn social_chunks(records: &[ContentRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let author = if record.author.trim().is_empty() {
                "unknown"
            } else {
                record.author.as_str()
            };
            let timestamp = record
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "(unknown time)".to_string());
            let text = if record.has_body() {
                record.body.as_str()
            } else if !record.snippet.trim().is_empty() {
                record.snippet.as_str()
            } else {
                "(no text)"
            };
            format!("@{author} – {timestamp}:\n{text}")
        })
        .collect()
}

/// Join chunks into the user-message content.
pub fn build_user_message(chunks: &[String]) -> String {
    if chunks.is_empty() {
        NO_CONTENT_PLACEHOLDER.to_string()
    } else {
        chunks.join(CHUNK_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn email_prefers_body() {
        let records = vec![
            ContentRecord::new("1")
                .with_subject("Budget")
                .with_body("Budget approved for Q3.")
                .with_snippet("Budget approved"),
            ContentRecord::new("2")
                .with_subject("Offsite")
                .with_snippet("Venue options attached"),
            ContentRecord::new("3").with_snippet("no subject here"),
        ];
        assert_eq!(
            email_chunks(&records),
            [
                "Budget approved for Q3.",
                "Subject: Offsite\nSnippet: Venue options attached",
                "Subject: (no subject)\nSnippet: no subject here",
            ]
        );
    }

    #[test]
    fn social_chunk_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let records = vec![
            ContentRecord::new("1")
                .with_author("rustlang")
                .with_timestamp(ts)
                .with_body("1.88 is out"),
            ContentRecord::new("2").with_snippet("teaser"),
            ContentRecord::new("3").with_author("ghost"),
        ];
        assert_eq!(
            social_chunks(&records),
            [
                "@rustlang – 2024-05-01T10:30:00Z:\n1.88 is out",
                "@unknown – (unknown time):\nteaser",
                "@ghost – (unknown time):\n(no text)",
            ]
        );
    }

    #[test]
    fn user_message_joins_or_placeholder() {
        assert_eq!(build_user_message(&[]), "No text found.");
        assert_eq!(
            build_user_message(&["a".to_string(), "b".to_string()]),
            "a\n\n---\n\nb"
        );
    }
}
