//! coderev-core: Shared types, configuration, and token cache for coderev
//!
//! This crate provides the wire types exchanged between the coderev client
//! and the in-codespace server, the error taxonomy, configuration
//! structures, and the local cache for claimed auth tokens.

pub mod config;
pub mod error;
pub mod token_cache;
pub mod types;

pub use error::ClientError;
pub use types::{AskRequest, AskResult, Codespace, HealthReport, SessionState};
