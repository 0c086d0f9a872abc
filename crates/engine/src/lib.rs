//! # Decentra Engine
//!
//! Turns retrieved content into a model summary:
//!
//! - [`normalize`]: records to prompt chunks
//! - [`context`]: context documents to the system prompt
//! - [`gateway`]: retrying, caching dispatch to a [`decentra_core::Backend`]
//! - [`response`]: raw backend results to text
//! - [`verbs`]: the named actions tying it together

pub mod cache;
pub mod context;
pub mod gateway;
pub mod normalize;
pub mod response;
pub mod retry;
pub mod verbs;

pub use cache::{ResponseCache, cache_key};
pub use context::{ContextAssembler, ContextSection};
pub use gateway::{CompletionOptions, GatewayResult, ModelGateway};
pub use response::{collect_stream, normalize_response};
pub use retry::RetryPolicy;
pub use verbs::{
    AdapterDegraded, EmailSummaryRequest, Orchestrator, SocialSummaryRequest, SummaryReport, Verb,
};
