//! Error types for ml-monitor-core operations.

use std::path::PathBuf;

/// All errors that can occur in ml-monitor-core operations.
///
/// Transient collaborator failures (process enumeration, nvidia-smi, ntfy) never
/// surface here; they degrade to "no data" at the call site. Everything in this
/// enum is either a persistence problem or a startup configuration problem.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    // ─────────────────────────────────────────────────────────────────────
    // State File Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to read state file: {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file: {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file malformed: {path}: {source}")]
    StateMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file malformed: {path}: key {key:?} is not a decimal pid")]
    InvalidPid { path: PathBuf, key: String },

    #[error("Failed to create directory: {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to read config file: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

/// Convenience type alias for Results using MonitorError.
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// True for errors caused by the contents of the state file rather than by
    /// the file system. Callers treat these as "start from an empty set".
    pub fn is_malformed_state(&self) -> bool {
        matches!(
            self,
            MonitorError::StateMalformed { .. } | MonitorError::InvalidPid { .. }
        )
    }
}
