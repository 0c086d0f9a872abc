//! Language-model backend implementations for Decentra.
//!
//! All backends implement the `decentra_core::Backend` trait.
//! The registry maps identifiers to backends based on configuration.

pub mod anthropic;
mod http;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use registry::{BackendRegistry, build_from_config};
