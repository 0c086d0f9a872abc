//! ContentSource trait: the abstraction over retrieval adapters.
//!
//! A source connects Decentra to a content provider (a mailbox, a social
//! feed). It never fails for "no results": an empty vec is the answer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentRecord;
use crate::error::AdapterError;

/// Well-known source identifiers.
pub const EMAIL_SOURCE: &str = "gmail";
pub const SOCIAL_SOURCE: &str = "twitter";

/// Source-specific narrowing of a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFilter {
    /// Mailbox query
    Mailbox { unread_only: bool },
    /// Feed query over a set of account handles
    Accounts {
        handles: Vec<String>,
        max_results: u32,
    },
}

/// A single retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Only items created at or after this instant
    pub since: DateTime<Utc>,

    /// Source-specific filter
    pub filter: FetchFilter,
}

/// The core ContentSource trait.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// A human-readable identifier (e.g. "gmail", "twitter").
    fn name(&self) -> &str;

    /// Retrieve records matching the request.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<ContentRecord>, AdapterError>;
}
