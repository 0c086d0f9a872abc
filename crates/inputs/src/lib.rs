//! Retrieval adapters for Decentra.
//!
//! Each adapter implements `decentra_core::ContentSource` and turns a
//! vendor API into [`ContentRecord`](decentra_core::ContentRecord)s.
//!
//! Available sources:
//! - **Gmail**: Gmail REST v1 with a bearer access token
//! - **Twitter**: X/Twitter API v2 with an app bearer token
//! - **Registry**: lookup of configured sources by identifier

pub mod gmail;
pub mod registry;
pub mod twitter;

pub use gmail::GmailSource;
pub use registry::{SourceRegistry, build_from_config};
pub use twitter::TwitterSource;
