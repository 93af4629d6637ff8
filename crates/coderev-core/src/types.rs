//! Core domain types
//!
//! Wire types shared between the coderev client and the in-codespace
//! server. Field naming follows the snake_case JSON the server speaks;
//! codespace types mirror the GitHub REST response shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a codespace as reported by the management API.
///
/// The API reports states as free-form strings; anything unrecognized maps
/// to `Unknown` rather than failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// State string not recognized
    #[default]
    Unknown,
    /// Codespace is being provisioned
    Creating,
    /// Codespace is booting
    Starting,
    /// Codespace is running and reachable
    Available,
    /// Codespace is in the process of stopping
    ShuttingDown,
    /// Codespace is stopped
    Shutdown,
}

impl SessionState {
    /// Parse the API's state string, defaulting to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "Creating" => SessionState::Creating,
            "Starting" => SessionState::Starting,
            "Available" => SessionState::Available,
            "ShuttingDown" => SessionState::ShuttingDown,
            "Shutdown" => SessionState::Shutdown,
            _ => SessionState::Unknown,
        }
    }

    /// Whether the codespace is stopped or stopping (requires a `start`)
    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Shutdown | SessionState::ShuttingDown)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unknown => "Unknown",
            SessionState::Creating => "Creating",
            SessionState::Starting => "Starting",
            SessionState::Available => "Available",
            SessionState::ShuttingDown => "ShuttingDown",
            SessionState::Shutdown => "Shutdown",
        };
        write!(f, "{}", s)
    }
}

impl<'de> Deserialize<'de> for SessionState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SessionState::parse(&s))
    }
}

impl Serialize for SessionState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// One codespace as returned by the management API.
///
/// Only the fields this system cares about; everything else in the API
/// response is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Codespace {
    /// Externally assigned unique name
    pub name: String,
    /// Raw lifecycle state string as reported by the API
    #[serde(default)]
    pub state: String,
    /// Owning repository
    #[serde(default)]
    pub repository: RepositoryRef,
    /// Git checkout status (carries the branch)
    #[serde(default)]
    pub git_status: GitStatus,
    /// Machine the codespace runs on
    #[serde(default)]
    pub machine: MachineRef,
}

impl Codespace {
    /// Parsed lifecycle state
    pub fn session_state(&self) -> SessionState {
        SessionState::parse(&self.state)
    }

    /// Full repository name (`owner/repo`)
    pub fn repo_full_name(&self) -> &str {
        &self.repository.full_name
    }

    /// Checked-out branch
    pub fn branch(&self) -> &str {
        &self.git_status.r#ref
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitStatus {
    #[serde(default)]
    pub r#ref: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MachineRef {
    #[serde(default)]
    pub display_name: String,
}

/// One question for the agent, immutable once submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question text (must be non-empty)
    pub question: String,
    /// Files to focus the agent on, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Git revision range to consider (e.g. `main..HEAD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_range: Option<String>,
    /// Model override passed through to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Upper bound on agent iterations
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Resume a prior agent conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn default_max_turns() -> u32 {
    10
}

impl AskRequest {
    /// Build a request with defaults for everything but the question
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            files: Vec::new(),
            diff_range: None,
            model: None,
            max_turns: default_max_turns(),
            session_id: None,
        }
    }
}

/// The agent's answer to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResult {
    /// Answer text
    pub answer: String,
    /// Continuation token for resuming the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Usage metrics, keys present only if the agent reported them
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub usage: BTreeMap<String, serde_json::Value>,
    /// Wall time of the execution window, excluding queue wait
    pub duration_seconds: f64,
}

/// Response of the server's unauthenticated health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub repo_dir: String,
    pub branch: String,
    pub commit: String,
    pub agent_version: String,
}
