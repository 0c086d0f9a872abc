//! X (Twitter) API v2: recent posts from a set of accounts.
//!
//! Resolves each handle to a user id, then pages through the user's
//! timeline from `start_time`, excluding retweets and replies. The
//! `max_results` cap applies across all accounts combined.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use decentra_core::source::SOCIAL_SOURCE;
use decentra_core::{
    AdapterError, ContentRecord, ContentSource, FetchFilter, FetchRequest, sort_newest_first,
};
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com/2";

/// Page size limit of the timeline endpoint.
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    #[serde(default)]
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    meta: Option<TimelineMeta>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineMeta {
    #[serde(default)]
    next_token: Option<String>,
}

/// Social feed source backed by the X API v2.
pub struct TwitterSource {
    bearer_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwitterSource {
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
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
            source_name: SOCIAL_SOURCE.into(),
            reason: reason.into(),
        }
    }

    /// GET a JSON document. Rejected credentials are an error for the whole
    /// fetch; anything else is reported per account by the caller.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(params)
            .send()
            .await
            .map_err(|e| Self::request_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::request_failed(format!("{url} returned {status}: {body}")));
        }

        resp.json().await.map_err(|e| AdapterError::InvalidPayload {
            source_name: SOCIAL_SOURCE.into(),
            reason: e.to_string(),
        })
    }

    async fn lookup_user_id(&self, handle: &str) -> Result<Option<String>, AdapterError> {
        let url = format!("{}/users/by/username/{}", self.base_url, handle);
        let resp: UserLookupResponse = self.get_json(&url, &[]).await?;
        Ok(resp.data.map(|d| d.id))
    }

    /// Fetch up to `limit` posts by one account.
    async fn user_timeline(
        &self,
        handle: &str,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, AdapterError> {
        let url = format!("{}/users/{}/tweets", self.base_url, user_id);
        let start_time = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut records = Vec::new();
        let mut pagination_token: Option<String> = None;

        while records.len() < limit {
            let mut params: Vec<(&str, String)> = vec![
                ("start_time", start_time.clone()),
                ("exclude", "retweets,replies".into()),
                ("tweet.fields", "created_at".into()),
                ("max_results", PAGE_SIZE.to_string()),
            ];
            if let Some(ref token) = pagination_token {
                params.push(("pagination_token", token.clone()));
            }

            let page: TimelineResponse = self.get_json(&url, &params).await?;
            if page.data.is_empty() {
                break;
            }

            records.extend(page.data.into_iter().map(|tweet| to_record(handle, tweet)));

            match page.meta.and_then(|m| m.next_token) {
                Some(token) => pagination_token = Some(token),
                None => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl ContentSource for TwitterSource {
    fn name(&self) -> &str {
        SOCIAL_SOURCE
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<ContentRecord>, AdapterError> {
        let FetchFilter::Accounts {
            ref handles,
            max_results,
        } = request.filter
        else {
            return Err(AdapterError::UnsupportedFilter(SOCIAL_SOURCE.into()));
        };

        let cap = max_results as usize;
        let mut records: Vec<ContentRecord> = Vec::new();
        let mut failures = 0usize;

        for handle in handles {
            if records.len() >= cap {
                break;
            }

            let user_id = match self.lookup_user_id(handle).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    warn!(account = %handle, "Could not resolve account");
                    continue;
                }
                Err(e) => {
                    warn!(account = %handle, error = %e, "Account lookup failed");
                    failures += 1;
                    continue;
                }
            };

            match self
                .user_timeline(handle, &user_id, request.since, cap - records.len())
                .await
            {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    warn!(account = %handle, error = %e, "Timeline fetch failed");
                    failures += 1;
                }
            }
        }

        if records.is_empty() && failures > 0 && failures == handles.len() {
            return Err(Self::request_failed(format!(
                "all {failures} account queries failed"
            )));
        }

        sort_newest_first(&mut records);
        info!(accounts = handles.len(), posts = records.len(), "Fetched posts");
        Ok(records)
    }
}

fn to_record(handle: &str, tweet: Tweet) -> ContentRecord {
    let mut record = ContentRecord::new(tweet.id)
        .with_author(handle)
        .with_body(tweet.text);
    if let Some(ts) = tweet
        .created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        record = record.with_timestamp(ts.with_timezone(&Utc));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_timeline_page() {
        let data = r#"{
            "data": [
                {"id": "2", "text": "Shipping today", "created_at": "2024-05-01T10:00:00.000Z"},
                {"id": "1", "text": "Draft"}
            ],
            "meta": {"result_count": 2, "next_token": "abc"}
        }"#;
        let page: TimelineResponse = serde_json::from_str(data).unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.meta.unwrap().next_token.as_deref(), Some("abc"));
    }

    #[test]
    fn empty_timeline_page_has_no_data() {
        let page: TimelineResponse =
            serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(page.data.is_empty());
    }

    #[test]
    fn record_from_tweet() {
        let tweet = Tweet {
            id: "42".into(),
            text: "Release notes are up".into(),
            created_at: Some("2024-05-01T10:00:00.000Z".into()),
        };
        let record = to_record("rustlang", tweet);
        assert_eq!(record.author, "rustlang");
        assert_eq!(record.body, "Release notes are up");
        assert_eq!(
            record.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }
}
