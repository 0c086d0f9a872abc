//! # Decentra Core
//!
//! Domain types, traits, and error definitions for the Decentra life
//! organizer. This crate has **no transport dependencies**: it defines the
//! domain model that the backend, input, engine and server crates implement
//! against.
//!
//! Every external collaborator is a trait here:
//! - [`Backend`] for language-model endpoints
//! - [`ContentSource`] for retrieval adapters (mail, social feeds)

pub mod backend;
pub mod content;
pub mod error;
pub mod message;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, DispatchPayload, FragmentStream, RawResponse, StreamFragment};
pub use content::{ContentRecord, parse_since, sort_newest_first};
pub use error::{AdapterError, BackendError, BackendErrorKind, Error, Result};
pub use message::{PromptMessage, Role};
pub use source::{ContentSource, FetchFilter, FetchRequest};
