//! Lifecycle tracking: the per-poll reconciliation between what is tracked and
//! what currently qualifies.
//!
//! # State machine
//!
//! ```text
//! untracked ──(qualifies, not tracked)──▶ tracked ──(absent from poll)──▶ removed
//!                                          │  ▲
//!                                          └──┘ (still qualifies: refresh lastChecked/auxMetrics)
//! ```
//!
//! "Removed" is not a stored state. [`LifecycleTracker::reconcile`] drops the entry
//! and hands back a [`Termination`]; [`deliver_terminations`] consumes those, so
//! each termination is notified at most once by construction.

use chrono::{DateTime, Utc};

use crate::gpu::AcceleratorSample;
use crate::notify::NotificationSink;
use crate::process::ProcessInfo;
use crate::types::{format_duration, TrackedEntry, TrackedSet};

/// A tracked process that disappeared from the qualifying set.
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    pub pid: u32,
    pub entry: TrackedEntry,
    pub ended_at: DateTime<Utc>,
}

impl Termination {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at.signed_duration_since(self.entry.started_at)
    }

    pub fn title(&self) -> String {
        format!("ML Process Ended - {}", self.entry.owner)
    }

    pub fn body(&self) -> String {
        format!(
            "Command: {}\nDuration: {}\nStart time: {}\nEnd time: {}",
            self.entry.command_line,
            format_duration(self.duration()),
            self.entry.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.ended_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// What one reconciliation did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub started: Vec<u32>,
    pub retained: usize,
    pub terminated: Vec<Termination>,
}

#[derive(Debug, Default, Clone)]
pub struct LifecycleTracker {
    entries: TrackedSet,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes from a previously persisted set.
    pub fn with_entries(entries: TrackedSet) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &TrackedSet {
        &self.entries
    }

    pub fn get(&self, pid: u32) -> Option<&TrackedEntry> {
        self.entries.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diffs the tracked set against `qualifying` and replaces it with
    /// retained ∪ created. Entries absent from `qualifying` are never carried
    /// forward; they come back as terminations.
    pub fn reconcile(
        &mut self,
        qualifying: &[&ProcessInfo],
        accelerator: &AcceleratorSample,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let mut previous = std::mem::take(&mut self.entries);
        let mut report = CycleReport::default();

        for process in qualifying {
            let aux_metrics = accelerator.query_usage(process.pid);
            match previous.remove(&process.pid) {
                Some(mut entry) => {
                    entry.last_checked_at = now;
                    entry.aux_metrics = aux_metrics;
                    self.entries.insert(process.pid, entry);
                    report.retained += 1;
                }
                None => {
                    tracing::info!(
                        pid = process.pid,
                        owner = %process.owner,
                        command = %process.command_line,
                        "Started tracking process"
                    );
                    self.entries.insert(
                        process.pid,
                        TrackedEntry {
                            command_line: process.command_line.clone(),
                            started_at: process.created_at,
                            owner: process.owner.clone(),
                            last_checked_at: now,
                            aux_metrics,
                        },
                    );
                    report.started.push(process.pid);
                }
            }
        }

        report.started.sort_unstable();
        report.terminated = previous
            .into_iter()
            .map(|(pid, entry)| Termination {
                pid,
                entry,
                ended_at: now,
            })
            .collect();

        for termination in &report.terminated {
            tracing::info!(
                pid = termination.pid,
                duration = %format_duration(termination.duration()),
                "Process terminated"
            );
        }

        report
    }
}

/// Sends one notification per termination. Failures are logged and dropped;
/// returns how many deliveries succeeded.
pub fn deliver_terminations<N>(terminations: Vec<Termination>, sink: &N) -> usize
where
    N: NotificationSink + ?Sized,
{
    let mut delivered = 0;
    for termination in terminations {
        if sink.deliver(&termination.title(), &termination.body()) {
            delivered += 1;
        } else {
            tracing::warn!(
                pid = termination.pid,
                "Termination notification not delivered; not retrying"
            );
        }
    }
    delivered
}
