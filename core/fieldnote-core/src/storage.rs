//! Storage configuration and path management for Fieldnote.
//!
//! All path decisions are centralized here so the daemon, the agent, and
//! tests agree on the on-disk layout. Production code uses
//! `StorageConfig::default()` (rooted at `~/.fieldnote/`); tests inject a
//! temp directory via `StorageConfig::with_root()`.

use std::path::{Path, PathBuf};

const SOCKET_NAME: &str = "daemon.sock";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all Fieldnote data (default: ~/.fieldnote)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".fieldnote"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the daemon's Unix socket.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join(SOCKET_NAME)
    }

    /// Path to the daemon's key/value store database.
    pub fn store_file(&self) -> PathBuf {
        self.root.join("daemon").join("store.db")
    }

    /// Path to config.toml (model endpoint, key, limits).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory the daemon renders final-report HTML into.
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Directory for agent log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path to the agent's local session mirror (summaries + page memos
    /// accumulated during the current activity).
    pub fn session_file(&self) -> PathBuf {
        self.root.join("agent-session.json")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.root.join("daemon"))?;
        fs_err::create_dir_all(self.reports_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
