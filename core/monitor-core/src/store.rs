//! File-backed tracked-set persistence.
//!
//! The daemon is the only writer; any number of viewers read. Writes go to a temp
//! file in the destination directory and are renamed into place, so readers see
//! either the previous snapshot or the new one, never a partial file.
//!
//! # Load semantics
//!
//! - Missing file: empty set (first run).
//! - Empty file: empty set, logged.
//! - Malformed content: [`MonitorError::StateMalformed`] / [`MonitorError::InvalidPid`].
//!   The daemon starts empty; the viewer keeps its previous rows for that tick.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs_err as fs;
use tempfile::NamedTempFile;

use crate::error::{MonitorError, Result};
use crate::types::{TrackedEntry, TrackedSet};

/// World-readable, owner-writable.
#[cfg(unix)]
const STATE_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the state file's parent directory. Failing here is fatal at startup.
    pub fn ensure_parent_dir(&self) -> Result<()> {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };
        fs::create_dir_all(parent).map_err(|source| MonitorError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })
    }

    pub fn load(&self) -> Result<TrackedSet> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(TrackedSet::new()),
            Err(source) => {
                return Err(MonitorError::StateRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "Empty state file, starting with no entries");
            return Ok(TrackedSet::new());
        }

        let raw: BTreeMap<String, TrackedEntry> =
            serde_json::from_str(&content).map_err(|source| MonitorError::StateMalformed {
                path: self.path.clone(),
                source,
            })?;

        raw.into_iter()
            .map(|(key, entry)| {
                key.trim()
                    .parse::<u32>()
                    .map(|pid| (pid, entry))
                    .map_err(|_| MonitorError::InvalidPid {
                        path: self.path.clone(),
                        key,
                    })
            })
            .collect()
    }

    /// Atomically replaces the state file with `entries`.
    pub fn save(&self, entries: &TrackedSet) -> Result<()> {
        let keyed: BTreeMap<String, &TrackedEntry> = entries
            .iter()
            .map(|(pid, entry)| (pid.to_string(), entry))
            .collect();
        let content = serde_json::to_string_pretty(&keyed).map_err(|source| {
            MonitorError::StateWrite {
                path: self.path.clone(),
                source: source.into(),
            }
        })?;

        let write_err = |source: std::io::Error| MonitorError::StateWrite {
            path: self.path.clone(),
            source,
        };

        let parent_dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // Dropping the temp file on any early return deletes it.
        let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(write_err)?;
        temp_file.write_all(content.as_bytes()).map_err(write_err)?;
        temp_file.flush().map_err(write_err)?;
        // Temp files start out 0600; viewers run as other users.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp_file
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(STATE_FILE_MODE))
                .map_err(write_err)?;
        }
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;

        tracing::debug!(entries = entries.len(), path = %self.path.display(), "State saved");
        Ok(())
    }
}
