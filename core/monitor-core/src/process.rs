//! Process table snapshots.
//!
//! The OS gives no termination events, so the tracker works from successive
//! point-in-time snapshots. [`SysinfoSource`] is the production source; tests
//! build [`ProcessSnapshot`]s by hand.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind, Users};

/// Point-in-time metadata for one live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub parent_pid: Option<u32>,
    pub owner: String,
    pub command_line: String,
    pub created_at: DateTime<Utc>,
}

/// The process table at one instant, indexed by pid.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    processes: HashMap<u32, ProcessInfo>,
}

impl ProcessSnapshot {
    pub fn new(processes: impl IntoIterator<Item = ProcessInfo>) -> Self {
        Self {
            processes: processes.into_iter().map(|p| (p.pid, p)).collect(),
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    /// Parent of `process`, if it was still present when the snapshot was taken.
    pub fn parent_of(&self, process: &ProcessInfo) -> Option<&ProcessInfo> {
        process.parent_pid.and_then(|ppid| self.processes.get(&ppid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

pub trait ProcessSource {
    /// Enumerates live processes. Never fails as a whole: processes that vanish
    /// mid-enumeration or whose metadata cannot be read are skipped.
    fn snapshot(&mut self) -> ProcessSnapshot;
}

/// Process source backed by `sysinfo`.
pub struct SysinfoSource {
    system: System,
    users: Users,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    fn owner_name(&self, process: &sysinfo::Process) -> Option<String> {
        let uid = process.user_id()?;
        let name = self
            .users
            .get_user_by_id(uid)
            .map(|user| user.name().to_string())
            .unwrap_or_else(|| numeric_uid(uid));
        Some(name)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    fn snapshot(&mut self) -> ProcessSnapshot {
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        // New accounts may appear while the daemon runs.
        self.users.refresh_list();

        let mut processes = Vec::with_capacity(self.system.processes().len());
        for (pid, process) in self.system.processes() {
            // Kernel threads and processes we cannot inspect have no owner.
            let Some(owner) = self.owner_name(process) else {
                continue;
            };
            let Some(created_at) = DateTime::from_timestamp(process.start_time() as i64, 0) else {
                continue;
            };
            processes.push(ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                parent_pid: process.parent().map(Pid::as_u32),
                owner,
                command_line: join_command_line(process.cmd()),
                created_at,
            });
        }

        tracing::trace!(processes = processes.len(), "Process snapshot taken");
        ProcessSnapshot::new(processes)
    }
}

#[cfg(unix)]
fn numeric_uid(uid: &sysinfo::Uid) -> String {
    (**uid).to_string()
}

#[cfg(not(unix))]
fn numeric_uid(uid: &sysinfo::Uid) -> String {
    format!("{uid:?}")
}

/// Joins an argument vector; an unreadable or empty one becomes `"Unknown"`.
pub fn join_command_line(args: &[String]) -> String {
    if args.is_empty() {
        "Unknown".to_string()
    } else {
        args.join(" ")
    }
}
