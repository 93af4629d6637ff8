//! Client-side configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the coderev client (CLI side)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// GitHub management API base URL
    pub github_api_base: String,

    /// Machine type requested for new codespaces
    pub machine_type: String,

    /// Idle timeout (minutes) requested for new codespaces
    pub idle_timeout_minutes: u32,

    /// How long to wait for a codespace to reach Available
    #[serde(with = "duration_secs")]
    pub boot_timeout: Duration,

    /// Sleep between codespace status polls
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// How long to wait for the in-codespace server to answer /health
    #[serde(with = "duration_secs")]
    pub health_timeout: Duration,

    /// Sleep between health probes
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,

    /// Client-side deadline for a buffered or streamed ask
    #[serde(with = "duration_secs")]
    pub ask_timeout: Duration,

    /// Local port the tunnel binds
    pub local_port: u16,

    /// Port the server listens on inside the codespace
    pub remote_port: u16,

    /// How long to let the tunnel process settle before checking it
    #[serde(with = "duration_secs")]
    pub tunnel_settle: Duration,

    /// Grace period between terminate and force-kill on tunnel close
    #[serde(with = "duration_secs")]
    pub tunnel_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            github_api_base: "https://api.github.com".to_string(),
            machine_type: "basicLinux32gb".to_string(),
            idle_timeout_minutes: 30,
            boot_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(120),
            health_interval: Duration::from_secs(2),
            ask_timeout: Duration::from_secs(300),
            local_port: 8976,
            remote_port: 8976,
            tunnel_settle: Duration::from_secs(2),
            tunnel_grace: Duration::from_secs(3),
        }
    }
}
