//! Codespace lifecycle management
//!
//! Drives a codespace through discovery, creation, start, and boot-wait
//! against the GitHub management API. All state transitions happen on the
//! remote side; this manager only observes them by polling.
//!
//! Mutating calls (`create`, `start`) are issued at most once per
//! `find_or_create` and are never retried; a failure propagates as the
//! API's error and the caller must re-invoke.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;

use coderev_core::config::ClientConfig;
use coderev_core::error::CodespaceError;
use coderev_core::types::{Codespace, SessionState};

/// GitHub REST API version header sent with every request
const API_VERSION: &str = "2022-11-28";

/// Per-request timeout for management API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct CodespaceList {
    #[serde(default)]
    codespaces: Vec<Codespace>,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    id: u64,
}

/// Manages codespace lifecycle via the GitHub REST API
pub struct CodespaceManager {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CodespaceManager {
    /// Create a manager authenticated with a GitHub token
    pub fn new(token: &str, config: ClientConfig) -> Result<Self, CodespaceError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| CodespaceError::Api(format!("Invalid GitHub token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CodespaceError::Api(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.github_api_base, path)
    }

    /// Resolve the numeric repository id for `owner/repo`.
    ///
    /// The list endpoint filters by id, not name, so this lookup is never
    /// skipped or guessed.
    pub async fn repo_id(&self, repo: &str) -> Result<u64, CodespaceError> {
        let resp = self
            .http
            .get(self.url(&format!("/repos/{}", repo)))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        let info: RepoInfo = read_json(resp).await?;
        Ok(info.id)
    }

    /// Find an existing codespace for an exact `(repo, branch)` pair
    pub async fn find(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Option<Codespace>, CodespaceError> {
        let codespaces = self.list_for_repo(repo).await?;
        Ok(codespaces
            .into_iter()
            .find(|cs| cs.repo_full_name() == repo && cs.branch() == branch))
    }

    /// Create a new codespace for `repo` on `branch`
    pub async fn create(&self, repo: &str, branch: &str) -> Result<Codespace, CodespaceError> {
        let body = json!({
            "ref": branch,
            "machine": self.config.machine_type,
            "idle_timeout_minutes": self.config.idle_timeout_minutes,
        });
        let resp = self
            .http
            .post(self.url(&format!("/repos/{}/codespaces", repo)))
            .json(&body)
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        read_json(resp).await
    }

    /// Start a stopped codespace
    pub async fn start(&self, name: &str) -> Result<Codespace, CodespaceError> {
        let resp = self
            .http
            .post(self.url(&format!("/user/codespaces/{}/start", name)))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        read_json(resp).await
    }

    /// Stop a running codespace
    pub async fn stop(&self, name: &str) -> Result<Codespace, CodespaceError> {
        let resp = self
            .http
            .post(self.url(&format!("/user/codespaces/{}/stop", name)))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        read_json(resp).await
    }

    /// Delete a codespace
    pub async fn delete(&self, name: &str) -> Result<(), CodespaceError> {
        let resp = self
            .http
            .delete(self.url(&format!("/user/codespaces/{}", name)))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        check_status(&resp).await
    }

    /// Fetch the current status of one codespace
    pub async fn get(&self, name: &str) -> Result<Codespace, CodespaceError> {
        let resp = self
            .http
            .get(self.url(&format!("/user/codespaces/{}", name)))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CodespaceError::NotFound(name.to_string()));
        }
        read_json(resp).await
    }

    /// List all codespaces for a repository
    pub async fn list_for_repo(&self, repo: &str) -> Result<Vec<Codespace>, CodespaceError> {
        let repo_id = self.repo_id(repo).await?;
        let resp = self
            .http
            .get(self.url("/user/codespaces"))
            .query(&[("repository_id", repo_id)])
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        let list: CodespaceList = read_json(resp).await?;
        Ok(list.codespaces)
    }

    /// List all of the user's codespaces
    pub async fn list_all(&self) -> Result<Vec<Codespace>, CodespaceError> {
        let resp = self
            .http
            .get(self.url("/user/codespaces"))
            .send()
            .await
            .map_err(|e| CodespaceError::Api(e.to_string()))?;
        let list: CodespaceList = read_json(resp).await?;
        Ok(list.codespaces)
    }

    /// Poll until the codespace reports `Available` or the boot deadline
    /// passes.
    ///
    /// Each non-Available observation is handed to `on_poll` with the raw
    /// state string so the caller can render progress. Exceeding the
    /// deadline yields [`CodespaceError::BootTimeout`] carrying the last
    /// observed state; the loop never overshoots the deadline by more
    /// than one poll interval.
    pub async fn wait_until_available<F>(
        &self,
        name: &str,
        mut on_poll: F,
    ) -> Result<Codespace, CodespaceError>
    where
        F: FnMut(&str),
    {
        let deadline = Instant::now() + self.config.boot_timeout;
        let mut last_state = String::from("Unknown");

        loop {
            let cs = self.get(name).await?;
            if cs.session_state() == SessionState::Available {
                return Ok(cs);
            }
            last_state = cs.state.clone();
            on_poll(&cs.state);

            if Instant::now() >= deadline {
                return Err(CodespaceError::BootTimeout {
                    name: name.to_string(),
                    last_state,
                    waited: self.config.boot_timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Find, start, or create a codespace for `(repo, branch)` and wait
    /// until it is Available. Returns the codespace name.
    ///
    /// - Already Available: returned immediately, no mutating call.
    /// - Stopped or stopping: exactly one `start`, then poll.
    /// - Any other transitional state: poll directly, no `start`.
    /// - Absent: exactly one `create`, then poll.
    pub async fn find_or_create<F>(
        &self,
        repo: &str,
        branch: &str,
        mut on_status: F,
    ) -> Result<String, CodespaceError>
    where
        F: FnMut(&str),
    {
        if let Some(cs) = self.find(repo, branch).await? {
            let name = cs.name.clone();
            let state = cs.session_state();

            if state == SessionState::Available {
                on_status(&format!("Reusing running codespace {}", name));
                return Ok(name);
            }

            if state.is_stopped() {
                on_status(&format!("Starting stopped codespace {}...", name));
                self.start(&name).await?;
            } else {
                on_status(&format!("Codespace {} is {}, waiting...", name, cs.state));
            }

            self.wait_until_available(&name, |s| {
                on_status(&format!("Codespace {}: {}", name, s))
            })
            .await?;
            return Ok(name);
        }

        on_status("Creating new codespace...");
        let cs = self.create(repo, branch).await?;
        let name = cs.name;
        on_status(&format!("Created {}, waiting for boot...", name));
        self.wait_until_available(&name, |s| on_status(&format!("Codespace {}: {}", name, s)))
            .await?;
        Ok(name)
    }
}

/// Fail on non-2xx, surfacing the status and a body excerpt
async fn check_status(resp: &reqwest::Response) -> Result<(), CodespaceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(CodespaceError::Api(format!(
            "{} from {}",
            status,
            resp.url()
        )))
    }
}

/// Read a JSON body, folding HTTP and decode failures into `Api`
async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, CodespaceError> {
    let status = resp.status();
    let url = resp.url().clone();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(200).collect();
        return Err(CodespaceError::Api(format!(
            "{} from {}: {}",
            status, url, excerpt
        )));
    }
    resp.json()
        .await
        .map_err(|e| CodespaceError::Unexpected(format!("{}: {}", url, e)))
}
