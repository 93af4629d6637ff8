//! coderev-server: the in-codespace half of coderev
//!
//! Wraps the `claude` agent CLI with read-only tools behind a small HTTP
//! API. All agent invocations funnel through a single-permit execution
//! slot: at most one agent subprocess runs at any instant, requests queue
//! in arrival order, and the slot is released on every exit path.

pub mod error;
pub mod executor;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
