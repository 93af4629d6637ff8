//! coderev-client: Codespace orchestration for the coderev CLI
//!
//! Drives a GitHub Codespace through its lifecycle, owns the port-forward
//! tunnel process, performs the one-time auth token handshake, and talks
//! to the in-codespace coderev server.

pub mod api;
pub mod auth;
pub mod codespace;
pub mod tunnel;

pub use api::ApiClient;
pub use codespace::CodespaceManager;
pub use tunnel::Tunnel;
