//! Local cache for claimed auth tokens
//!
//! The in-codespace server hands out its bearer token exactly once per
//! server process. The cache keeps the last successfully claimed token per
//! codespace name so a restarted client can keep talking to the same
//! server without forcing a remote restart.
//!
//! # Security Model
//!
//! - One JSON file per codespace name under the cache directory
//! - Files are written with mode 0600 (owner read/write only) on Unix
//! - A malformed or unreadable file is treated as a cache miss, never an
//!   error: the caller falls back to the terminal "credentials
//!   unavailable" path

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::default_cache_dir;

/// On-disk shape of one cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    token: String,
}

/// Per-codespace token cache rooted at a directory
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    /// Cache rooted at the default location (`~/.cache/coderev`)
    pub fn new() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }

    /// Cache rooted at a custom directory (used by tests)
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, codespace_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", codespace_name))
    }

    /// Load the cached token for a codespace.
    ///
    /// Missing or malformed entries are a miss (`None`), not an error.
    pub fn load(&self, codespace_name: &str) -> Option<String> {
        let path = self.entry_path(codespace_name);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CachedToken>(&contents) {
            Ok(entry) => Some(entry.token),
            Err(_) => {
                tracing::debug!("Token cache entry at {:?} is not valid JSON", path);
                None
            }
        }
    }

    /// Persist a freshly claimed token for a codespace.
    ///
    /// Creates the cache directory if needed and restricts the entry to
    /// owner read/write on Unix.
    pub fn save(&self, codespace_name: &str, token: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(codespace_name);
        let entry = CachedToken {
            token: token.to_string(),
        };
        let contents = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roots_at_default_cache_dir() {
        let cache = TokenCache::default();
        assert_eq!(cache.dir, crate::config::default_cache_dir());
    }

    #[test]
    fn test_load_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());
        assert_eq!(cache.load("no-such-codespace"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());

        cache.save("fuzzy-garbanzo", "s3cr3t").unwrap();
        assert_eq!(cache.load("fuzzy-garbanzo").as_deref(), Some("s3cr3t"));
        // Entries are keyed by name
        assert_eq!(cache.load("other-codespace"), None);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());

        cache.save("cs", "first").unwrap();
        cache.save("cs", "second").unwrap();
        assert_eq!(cache.load("cs").as_deref(), Some("second"));
    }

    #[test]
    fn test_malformed_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());

        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "not json").unwrap();
        assert_eq!(cache.load("broken"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_permissions_restricted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());
        cache.save("cs", "tok").unwrap();

        let meta = fs::metadata(dir.path().join("cs.json")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
