//! Shared server state
//!
//! One `AppState` per server process. It owns the two pieces of mutable
//! state the whole design revolves around:
//!
//! - the execution slot, a semaphore with exactly one permit, so agent
//!   invocations serialize in arrival order and a timed-out request can
//!   never starve the next one (permits release on drop);
//! - the claim flag for the one-time auth token handout, guarded by a
//!   mutex so two near-simultaneous claims cannot both observe
//!   "unclaimed".

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use coderev_core::config::ServerConfig;

/// Length of a minted auth token in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

/// Generate a new random bearer token (64 hex chars)
pub fn generate_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Process-wide server state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// The bearer token every authorized request must present
    pub auth_token: String,
    /// Whether the one-time token handout has happened
    pub claimed: Mutex<bool>,
    /// The execution slot: exactly one agent subprocess at a time
    pub slot: Arc<Semaphore>,
}

impl AppState {
    /// Fresh state with an unclaimed token and a free slot
    pub fn new(config: ServerConfig, auth_token: String) -> Self {
        Self {
            config,
            auth_token,
            claimed: Mutex::new(false),
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Number of free slot permits (1 when idle, 0 while an agent runs)
    pub fn available_slots(&self) -> usize {
        self.slot.available_permits()
    }
}
