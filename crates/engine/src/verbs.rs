//! Verb orchestration: the named actions a user can run.
//!
//! Every verb follows the same pipeline, awaited in sequence on the calling
//! task:
//!
//! ```text
//! validate → since → fetch → (sort) → chunks → system prompt → gateway → text
//! ```
//!
//! Retrieval never fails a verb. A missing or failing source yields an empty
//! record set and an [`AdapterDegraded`] on the report; the model is then asked
//! to summarize `No text found.`. Gateway failures propagate unchanged.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use decentra_config::AppConfig;
use decentra_core::source::{EMAIL_SOURCE, SOCIAL_SOURCE};
use decentra_core::{ContentRecord, Error, FetchFilter, FetchRequest, PromptMessage, Result};
use decentra_inputs::SourceRegistry;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::context::ContextAssembler;
use crate::gateway::{CompletionOptions, ModelGateway};
use crate::normalize::{build_user_message, email_chunks, social_chunks, sort_newest_first};

pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;
pub const DEFAULT_SOCIAL_MAX_RESULTS: u32 = 1000;

/// Parameters of the mailbox summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummaryRequest {
    pub lookback_hours: u32,
    pub unread_only: bool,
    /// Explicit window start; overrides `lookback_hours`
    pub since: Option<DateTime<Utc>>,
    /// Backend identifier; the configured default applies when unset
    pub backend: Option<String>,
    pub cache: bool,
}

impl Default for EmailSummaryRequest {
    fn default() -> Self {
        Self {
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            unread_only: true,
            since: None,
            backend: None,
            cache: false,
        }
    }
}

/// Parameters of the social feed summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSummaryRequest {
    pub accounts: Vec<String>,
    pub lookback_hours: u32,
    /// Cap on posts across all accounts
    pub max_results: u32,
    pub since: Option<DateTime<Utc>>,
    pub backend: Option<String>,
    pub cache: bool,
}

impl Default for SocialSummaryRequest {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            max_results: DEFAULT_SOCIAL_MAX_RESULTS,
            since: None,
            backend: None,
            cache: false,
        }
    }
}

impl SocialSummaryRequest {
    pub fn for_accounts<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accounts: accounts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A named action.
#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    EmailSummary(EmailSummaryRequest),
    SocialSummary(SocialSummaryRequest),
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Verb::EmailSummary(_) => "email_summary",
            Verb::SocialSummary(_) => "social_summary",
        }
    }
}

/// Why retrieval contributed nothing to a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterDegraded {
    /// No source is registered under this name (usually missing credentials)
    Missing { source: String },
    /// The source returned an error
    Failed { source: String, reason: String },
    /// The source answered with no records
    Empty { source: String },
}

impl AdapterDegraded {
    pub fn source(&self) -> &str {
        match self {
            AdapterDegraded::Missing { source }
            | AdapterDegraded::Failed { source, .. }
            | AdapterDegraded::Empty { source } => source,
        }
    }
}

/// The outcome of a verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summary: String,
    /// Records that went into the prompt
    pub item_count: usize,
    pub degraded: Option<AdapterDegraded>,
}

/// Runs verbs against the configured sources and model gateway.
pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    sources: SourceRegistry,
    assembler: ContextAssembler,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        sources: SourceRegistry,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            gateway,
            sources,
            assembler,
        }
    }

    /// Wire the gateway, sources and context directory from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ModelGateway::from_config(config),
            decentra_inputs::build_from_config(config),
            ContextAssembler::from_config(&config.context),
        )
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Run a named action.
    pub async fn run(&self, verb: Verb) -> Result<SummaryReport> {
        info!(verb = verb.name(), "Running verb");
        match verb {
            Verb::EmailSummary(req) => self.summarize_email(req).await,
            Verb::SocialSummary(req) => self.summarize_social(req).await,
        }
    }

    /// Summarize recent mail.
    pub async fn summarize_email(&self, req: EmailSummaryRequest) -> Result<SummaryReport> {
        let request = FetchRequest {
            since: window_start(req.since, req.lookback_hours)?,
            filter: FetchFilter::Mailbox {
                unread_only: req.unread_only,
            },
        };

        let (records, degraded) = self.retrieve(EMAIL_SOURCE, &request).await;
        let chunks = email_chunks(&records);

        let summary = self.summarize(&chunks, req.backend, req.cache).await?;

        Ok(SummaryReport {
            summary,
            item_count: records.len(),
            degraded,
        })
    }

    /// Summarize recent posts by a set of accounts.
    pub async fn summarize_social(&self, req: SocialSummaryRequest) -> Result<SummaryReport> {
        let handles = normalize_accounts(&req.accounts);
        if handles.is_empty() {
            error!("Social summary requested without any accounts");
            return Err(Error::InvalidArgument(
                "at least one account is required".into(),
            ));
        }

        let request = FetchRequest {
            since: window_start(req.since, req.lookback_hours)?,
            filter: FetchFilter::Accounts {
                handles,
                max_results: req.max_results,
            },
        };

        let (mut records, degraded) = self.retrieve(SOCIAL_SOURCE, &request).await;
        sort_newest_first(&mut records);
        let chunks = social_chunks(&records);

        let summary = self.summarize(&chunks, req.backend, req.cache).await?;

        Ok(SummaryReport {
            summary,
            item_count: records.len(),
            degraded,
        })
    }

    /// Fetch from a source, absorbing every failure into a degradation.
    async fn retrieve(
        &self,
        source_name: &str,
        request: &FetchRequest,
    ) -> (Vec<ContentRecord>, Option<AdapterDegraded>) {
        let Some(source) = self.sources.get(source_name) else {
            warn!(source = source_name, "Source not configured, summarizing without content");
            return (
                Vec::new(),
                Some(AdapterDegraded::Missing {
                    source: source_name.to_string(),
                }),
            );
        };

        match source.fetch(request).await {
            Ok(records) if records.is_empty() => {
                warn!(source = source_name, "Source returned no records");
                (
                    records,
                    Some(AdapterDegraded::Empty {
                        source: source_name.to_string(),
                    }),
                )
            }
            Ok(records) => {
                info!(source = source_name, records = records.len(), "Fetched records");
                (records, None)
            }
            Err(e) => {
                error!(source = source_name, error = %e, "Retrieval failed, summarizing without content");
                (
                    Vec::new(),
                    Some(AdapterDegraded::Failed {
                        source: source_name.to_string(),
                        reason: e.to_string(),
                    }),
                )
            }
        }
    }

    async fn summarize(
        &self,
        chunks: &[String],
        backend: Option<String>,
        cache: bool,
    ) -> Result<String> {
        let messages = [
            self.assembler.system_message(),
            PromptMessage::user(build_user_message(chunks)),
        ];
        let options = CompletionOptions {
            backend,
            cache,
            ..CompletionOptions::default()
        };
        self.gateway.complete_text(&messages, &options).await
    }
}

/// Trim handles, drop a leading `@` and discard blanks.
fn normalize_accounts(accounts: &[String]) -> Vec<String> {
    accounts
        .iter()
        .map(|a| a.trim().trim_start_matches('@').trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Explicit start, else now minus the lookback. Fails when the lookback
/// reaches past the representable date range.
fn window_start(since: Option<DateTime<Utc>>, lookback_hours: u32) -> Result<DateTime<Utc>> {
    if let Some(since) = since {
        return Ok(since);
    }
    Utc::now()
        .checked_sub_signed(Duration::hours(i64::from(lookback_hours)))
        .ok_or_else(|| {
            error!(lookback_hours, "Lookback window out of range");
            Error::InvalidArgument(format!("lookback window of {lookback_hours} hours is out of range"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use decentra_backends::BackendRegistry;
    use decentra_core::{
        AdapterError, Backend, BackendError, ContentSource, DispatchPayload, FragmentStream,
        RawResponse, Role,
    };

    /// Echoes the user message back as the completion.
    struct EchoBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn dispatch(
            &self,
            payload: DispatchPayload,
        ) -> std::result::Result<RawResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let user = payload
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(RawResponse::Text(user))
        }

        async fn dispatch_stream(
            &self,
            _payload: DispatchPayload,
        ) -> std::result::Result<FragmentStream, BackendError> {
            Err(BackendError::invalid_request("streaming not scripted"))
        }
    }

    /// Call-counting source with a fixed answer.
    struct FakeSource {
        name: &'static str,
        answer: std::result::Result<Vec<ContentRecord>, String>,
        calls: AtomicU32,
        last_request: Mutex<Option<FetchRequest>>,
    }

    impl FakeSource {
        fn new(
            name: &'static str,
            answer: std::result::Result<Vec<ContentRecord>, String>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer,
                calls: AtomicU32::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> Option<FetchRequest> {
            self.last_request.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(
            &self,
            request: &FetchRequest,
        ) -> std::result::Result<Vec<ContentRecord>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.answer
                .clone()
                .map_err(|reason| AdapterError::RequestFailed {
                    source_name: self.name.into(),
                    reason,
                })
        }
    }

    fn orchestrator(sources: &[Arc<FakeSource>]) -> (Orchestrator, Arc<EchoBackend>) {
        let backend = Arc::new(EchoBackend {
            calls: AtomicU32::new(0),
        });
        let mut backends = BackendRegistry::new("echo");
        backends.register("echo", backend.clone());

        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source.clone());
        }

        let orchestrator = Orchestrator::new(
            Arc::new(ModelGateway::new(backends)),
            registry,
            ContextAssembler::new("/nonexistent/decentra/context"),
        );
        (orchestrator, backend)
    }

    fn three_mails() -> Vec<ContentRecord> {
        vec![
            ContentRecord::new("m1")
                .with_subject("Budget")
                .with_body("Budget approved for Q3."),
            ContentRecord::new("m2")
                .with_subject("Hiring")
                .with_body("Two offers accepted."),
            ContentRecord::new("m3")
                .with_subject("Offsite")
                .with_snippet("Venue options attached"),
        ]
    }

    #[tokio::test]
    async fn email_summary_keeps_adapter_order() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(three_mails()));
        let (orchestrator, _) = orchestrator(&[gmail.clone()]);

        let report = orchestrator
            .summarize_email(EmailSummaryRequest::default())
            .await
            .unwrap();

        assert_eq!(
            report.summary,
            "Budget approved for Q3.\n\n---\n\nTwo offers accepted.\n\n---\n\n\
             Subject: Offsite\nSnippet: Venue options attached"
        );
        assert_eq!(report.item_count, 3);
        assert_eq!(report.degraded, None);

        let request = gmail.last_request().unwrap();
        assert_eq!(request.filter, FetchFilter::Mailbox { unread_only: true });
    }

    #[tokio::test]
    async fn lookback_window_sets_since() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(three_mails()));
        let (orchestrator, _) = orchestrator(&[gmail.clone()]);

        let before = Utc::now();
        orchestrator
            .summarize_email(EmailSummaryRequest {
                lookback_hours: 6,
                unread_only: false,
                ..EmailSummaryRequest::default()
            })
            .await
            .unwrap();
        let after = Utc::now();

        let since = gmail.last_request().unwrap().since;
        assert!(since >= before - Duration::hours(6));
        assert!(since <= after - Duration::hours(6));
    }

    #[tokio::test]
    async fn out_of_range_lookback_is_invalid_argument() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(three_mails()));
        let (orchestrator, _) = orchestrator(&[gmail.clone()]);

        let err = orchestrator
            .summarize_email(EmailSummaryRequest {
                lookback_hours: u32::MAX,
                ..EmailSummaryRequest::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(gmail.last_request().is_none());
    }

    #[tokio::test]
    async fn explicit_since_overrides_lookback() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(three_mails()));
        let (orchestrator, _) = orchestrator(&[gmail.clone()]);
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        orchestrator
            .summarize_email(EmailSummaryRequest {
                since: Some(since),
                ..EmailSummaryRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(gmail.last_request().unwrap().since, since);
    }

    #[tokio::test]
    async fn zero_accounts_fails_before_fetching() {
        let twitter = FakeSource::new(SOCIAL_SOURCE, Ok(Vec::new()));
        let (orchestrator, backend) = orchestrator(&[twitter.clone()]);

        for accounts in [vec![], vec!["".to_string(), "  @ ".to_string()]] {
            let err = orchestrator
                .run(Verb::SocialSummary(SocialSummaryRequest::for_accounts(accounts)))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }

        assert_eq!(twitter.calls(), 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn social_summary_sorts_newest_first() {
        let t = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();
        let twitter = FakeSource::new(
            SOCIAL_SOURCE,
            Ok(vec![
                ContentRecord::new("1")
                    .with_author("a")
                    .with_timestamp(t(8))
                    .with_body("early"),
                ContentRecord::new("2").with_author("b").with_body("undated"),
                ContentRecord::new("3")
                    .with_author("a")
                    .with_timestamp(t(12))
                    .with_body("late"),
            ]),
        );
        let (orchestrator, _) = orchestrator(&[twitter.clone()]);

        let report = orchestrator
            .summarize_social(SocialSummaryRequest::for_accounts([" @a", "b"]))
            .await
            .unwrap();

        assert_eq!(
            report.summary,
            "@a – 2024-05-01T12:00:00Z:\nlate\n\n---\n\n\
             @a – 2024-05-01T08:00:00Z:\nearly\n\n---\n\n\
             @b – (unknown time):\nundated"
        );

        let request = twitter.last_request().unwrap();
        assert_eq!(
            request.filter,
            FetchFilter::Accounts {
                handles: vec!["a".into(), "b".into()],
                max_results: DEFAULT_SOCIAL_MAX_RESULTS,
            }
        );
    }

    #[tokio::test]
    async fn missing_source_degrades_to_placeholder() {
        let (orchestrator, backend) = orchestrator(&[]);

        let report = orchestrator
            .run(Verb::EmailSummary(EmailSummaryRequest::default()))
            .await
            .unwrap();

        assert_eq!(report.summary, "No text found.");
        assert_eq!(report.item_count, 0);
        assert_eq!(
            report.degraded,
            Some(AdapterDegraded::Missing {
                source: EMAIL_SOURCE.into()
            })
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_source_degrades_instead_of_failing() {
        let twitter = FakeSource::new(SOCIAL_SOURCE, Err("401 Unauthorized".into()));
        let (orchestrator, _) = orchestrator(&[twitter.clone()]);

        let report = orchestrator
            .summarize_social(SocialSummaryRequest::for_accounts(["rustlang"]))
            .await
            .unwrap();

        assert_eq!(report.summary, "No text found.");
        match report.degraded {
            Some(AdapterDegraded::Failed { source, reason }) => {
                assert_eq!(source, SOCIAL_SOURCE);
                assert!(reason.contains("401"));
            }
            other => panic!("expected failed degradation, got {other:?}"),
        }
        assert_eq!(twitter.calls(), 1);
    }

    #[tokio::test]
    async fn empty_fetch_is_recorded() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(Vec::new()));
        let (orchestrator, _) = orchestrator(&[gmail]);

        let report = orchestrator
            .summarize_email(EmailSummaryRequest::default())
            .await
            .unwrap();
        assert_eq!(
            report.degraded.as_ref().map(AdapterDegraded::source),
            Some(EMAIL_SOURCE)
        );
        assert_eq!(report.summary, "No text found.");
    }

    #[tokio::test]
    async fn cached_verbs_dispatch_once() {
        let gmail = FakeSource::new(EMAIL_SOURCE, Ok(three_mails()));
        let (orchestrator, backend) = orchestrator(&[gmail.clone()]);

        let req = EmailSummaryRequest {
            cache: true,
            ..EmailSummaryRequest::default()
        };
        let first = orchestrator.summarize_email(req.clone()).await.unwrap();
        let second = orchestrator.summarize_email(req).await.unwrap();

        assert_eq!(first.summary, second.summary);
        assert_eq!(gmail.calls(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn degradation_serializes_with_kind() {
        let report = SummaryReport {
            summary: "No text found.".into(),
            item_count: 0,
            degraded: Some(AdapterDegraded::Failed {
                source: "gmail".into(),
                reason: "timeout".into(),
            }),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["degraded"]["kind"], "failed");
        assert_eq!(json["degraded"]["source"], "gmail");
        assert_eq!(json["item_count"], 0);
    }

    #[test]
    fn accounts_are_trimmed() {
        let accounts = vec![" @rustlang ".to_string(), "".into(), "tokio_rs".into()];
        assert_eq!(normalize_accounts(&accounts), ["rustlang", "tokio_rs"]);
    }
}
