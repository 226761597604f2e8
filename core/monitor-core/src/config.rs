//! Daemon configuration: built-in defaults, an optional TOML file, and CLI
//! overrides applied by the binary (flag > file > default).
//!
//! ```toml
//! [notify]
//! server = "ntfy.example.com"
//! topic = "phone_only"
//!
//! [monitor]
//! check_interval_secs = 5
//! target_names = ["python", "python3"]
//!
//! [storage]
//! state_file = "/var/lib/ml-monitor/state.json"
//!
//! [logging]
//! file = "/var/log/ml-monitor.log"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MonitorError, Result};
use crate::filter::DEFAULT_TARGET_NAMES;

pub const DEFAULT_STATE_FILE: &str = "/var/lib/ml-monitor/state.json";
pub const DEFAULT_LOG_FILE: &str = "/var/log/ml-monitor.log";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/ml-monitor/config.toml";
pub const DEFAULT_NTFY_SERVER: &str = "ntfy.sh";
pub const DEFAULT_NTFY_TOPIC: &str = "phone_only";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 1;
/// Upper bound for poll and refresh intervals (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NotifyConfig {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            topic: default_topic(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MonitorSection {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_target_names")]
    pub target_names: Vec<String>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            target_names: default_target_names(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageSection {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingSection {
    /// Log file path; `-` logs to stderr.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DaemonConfig {
    /// Loads `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(MonitorError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&content).map_err(|err| MonitorError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    /// Rejects values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.check_interval_secs == 0 {
            return Err(MonitorError::InvalidConfig(
                "check interval must be at least 1 second".to_string(),
            ));
        }
        if self.monitor.check_interval_secs > MAX_INTERVAL_SECS {
            return Err(MonitorError::InvalidConfig(format!(
                "check interval must be at most {MAX_INTERVAL_SECS} seconds"
            )));
        }
        if self.monitor.target_names.iter().all(|n| n.trim().is_empty()) {
            return Err(MonitorError::InvalidConfig(
                "at least one target process name is required".to_string(),
            ));
        }
        if self.notify.server.trim().is_empty() || self.notify.topic.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "notification server and topic are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.check_interval_secs)
    }

    /// `None` means log to stderr.
    pub fn log_file(&self) -> Option<&Path> {
        if self.logging.file.as_os_str() == "-" {
            None
        } else {
            Some(&self.logging.file)
        }
    }
}

fn default_server() -> String {
    DEFAULT_NTFY_SERVER.to_string()
}

fn default_topic() -> String {
    DEFAULT_NTFY_TOPIC.to_string()
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_target_names() -> Vec<String> {
    DEFAULT_TARGET_NAMES.iter().map(|s| s.to_string()).collect()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}
