//! Port-forward tunnel process management
//!
//! Owns the `gh codespace ports forward` subprocess that maps a local TCP
//! port to the server port inside the codespace. No other component may
//! signal or reap this process.
//!
//! `open` is idempotent while the child is alive; `close` is idempotent
//! and safe on a never-opened tunnel. The child is spawned with
//! `kill_on_drop` so it cannot outlive the client even when `close` is
//! skipped by a panic or early return.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use coderev_core::config::ClientConfig;
use coderev_core::error::TunnelError;

/// Longest stderr excerpt surfaced in a startup failure
const STDERR_EXCERPT_LEN: usize = 500;

/// A local port forwarded to a port inside one codespace
pub struct Tunnel {
    argv: Vec<String>,
    local_port: u16,
    settle: Duration,
    grace: Duration,
    child: Option<Child>,
}

impl Tunnel {
    /// Tunnel for `codespace_name` using the ports from `config`
    pub fn new(codespace_name: &str, config: &ClientConfig) -> Self {
        let argv = vec![
            "gh".to_string(),
            "codespace".to_string(),
            "ports".to_string(),
            "forward".to_string(),
            format!("{}:{}", config.local_port, config.remote_port),
            "-c".to_string(),
            codespace_name.to_string(),
        ];
        Self {
            argv,
            local_port: config.local_port,
            settle: config.tunnel_settle,
            grace: config.tunnel_grace,
            child: None,
        }
    }

    /// Base URL for requests through the tunnel
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }

    /// Spawn the forwarding process and let it settle.
    ///
    /// No-op if a managed child is already alive. A child that has
    /// already exited after the settling interval fails with
    /// [`TunnelError::StartFailed`] carrying its stderr.
    pub async fn open(&mut self) -> Result<(), TunnelError> {
        if let Some(child) = &mut self.child {
            if child.try_wait()?.is_none() {
                return Ok(());
            }
            // Previous child died; clear the handle and respawn
            self.child = None;
        }

        tracing::debug!("Spawning tunnel: {}", self.argv.join(" "));
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // The forwarder fails fast on bad codespace names or auth problems;
        // give it a moment, then make sure it is still up.
        tokio::time::sleep(self.settle).await;

        if child.try_wait()?.is_some() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_LEN).collect();
            return Err(TunnelError::StartFailed { stderr: excerpt });
        }

        self.child = Some(child);
        Ok(())
    }

    /// Terminate the forwarding process.
    ///
    /// Asks politely first (SIGTERM on Unix), waits up to the grace
    /// period, then force-kills. Clears the handle so a later `open` can
    /// respawn.
    pub async fn close(&mut self) -> Result<(), TunnelError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SAFETY: pid came from a live child we own
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if tokio::time::timeout(self.grace, child.wait()).await.is_ok() {
                return Ok(());
            }
            tracing::warn!("Tunnel did not exit within {:?}, force-killing", self.grace);
        }

        child.kill().await?;
        Ok(())
    }

    /// Whether a managed child is currently alive
    pub fn is_open(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_tunnel(script: &str) -> Tunnel {
        Tunnel {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            local_port: 8976,
            settle: Duration::from_millis(100),
            grace: Duration::from_millis(300),
            child: None,
        }
    }

    #[tokio::test]
    async fn test_open_surfaces_stderr_on_immediate_exit() {
        let mut tunnel = shell_tunnel("echo 'forward failed: unknown codespace' >&2; exit 1");
        let err = tunnel.open().await.unwrap_err();
        match err {
            TunnelError::StartFailed { stderr } => {
                assert!(stderr.contains("unknown codespace"));
            }
            other => panic!("expected StartFailed, got {:?}", other),
        }
        assert!(!tunnel.is_open());
    }

    #[tokio::test]
    async fn test_open_is_idempotent_while_alive() {
        let mut tunnel = shell_tunnel("sleep 30");
        tunnel.open().await.unwrap();
        assert!(tunnel.is_open());
        // Second open must not spawn a second process
        tunnel.open().await.unwrap();
        assert!(tunnel.is_open());
        tunnel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut tunnel = shell_tunnel("sleep 30");
        tunnel.open().await.unwrap();
        tunnel.close().await.unwrap();
        assert!(!tunnel.is_open());
        tunnel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_on_never_opened_tunnel() {
        let mut tunnel = shell_tunnel("sleep 30");
        tunnel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let mut tunnel = shell_tunnel("sleep 30");
        tunnel.open().await.unwrap();
        tunnel.close().await.unwrap();
        tunnel.open().await.unwrap();
        assert!(tunnel.is_open());
        tunnel.close().await.unwrap();
    }

    #[test]
    fn test_gh_argv_shape() {
        let config = ClientConfig::default();
        let tunnel = Tunnel::new("fuzzy-garbanzo", &config);
        assert_eq!(tunnel.argv[0], "gh");
        assert!(tunnel.argv.contains(&"forward".to_string()));
        assert!(tunnel.argv.contains(&"8976:8976".to_string()));
        assert!(tunnel.argv.contains(&"fuzzy-garbanzo".to_string()));
        assert_eq!(tunnel.local_url(), "http://127.0.0.1:8976");
    }
}
