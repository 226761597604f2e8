//! The polling driver.
//!
//! One tick: snapshot → accelerator sample → filter → reconcile → notify →
//! persist. [`Monitor`] owns the tracked set and every collaborator; nothing is
//! shared with other threads except the stop flag.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ml_monitor_core::{
    deliver_terminations, AcceleratorReader, IdentityFilter, LifecycleTracker, NotificationSink,
    ProcessSource, StateStore, TrackedSet,
};
use tracing::{debug, info, warn};

use crate::signal::StopSignal;

/// Counts from one tick, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub started: Vec<u32>,
    pub retained: usize,
    pub terminated: Vec<u32>,
    pub notified: usize,
    pub persisted: bool,
}

pub struct Monitor<S, A, N> {
    source: S,
    reader: A,
    sink: N,
    filter: IdentityFilter,
    tracker: LifecycleTracker,
    store: StateStore,
    self_pid: u32,
}

impl<S, A, N> Monitor<S, A, N>
where
    S: ProcessSource,
    A: AcceleratorReader,
    N: NotificationSink,
{
    pub fn new(source: S, reader: A, sink: N, filter: IdentityFilter, store: StateStore) -> Self {
        Self {
            source,
            reader,
            sink,
            filter,
            tracker: LifecycleTracker::new(),
            store,
            self_pid: std::process::id(),
        }
    }

    /// Overrides the pid the filter treats as "self".
    pub fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self
    }

    /// Loads the persisted set. Any load failure starts from an empty set.
    pub fn resume(&mut self) {
        match self.store.load() {
            Ok(entries) => {
                info!(processes = entries.len(), path = %self.store.path().display(), "State loaded");
                self.tracker = LifecycleTracker::with_entries(entries);
            }
            Err(err) => {
                warn!(error = %err, "Failed to load state; starting with no tracked processes");
                self.tracker = LifecycleTracker::new();
            }
        }
    }

    pub fn tracked(&self) -> &TrackedSet {
        self.tracker.entries()
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleSummary {
        let snapshot = self.source.snapshot();
        let accelerator = self.reader.sample();
        let qualifying = self.filter.qualifying(&snapshot, self.self_pid);
        debug!(
            processes = snapshot.len(),
            qualifying = qualifying.len(),
            "Poll"
        );

        let report = self.tracker.reconcile(&qualifying, &accelerator, now);
        let terminated = report.terminated.iter().map(|t| t.pid).collect();
        let notified = deliver_terminations(report.terminated, &self.sink);
        let persisted = self.persist();

        CycleSummary {
            started: report.started,
            retained: report.retained,
            terminated,
            notified,
            persisted,
        }
    }

    /// Writes the tracked set. A failed write is logged and retried next tick.
    pub fn persist(&self) -> bool {
        match self.store.save(self.tracker.entries()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Failed to save state");
                false
            }
        }
    }

    /// Polls every `interval` until `stop` is requested, then persists once more.
    pub fn run(&mut self, interval: Duration, stop: &StopSignal) {
        info!(
            interval_secs = interval.as_secs(),
            tracked = self.tracker.len(),
            "ML monitor daemon started"
        );
        while !stop.is_requested() {
            let summary = self.run_cycle(Utc::now());
            if !summary.started.is_empty() || !summary.terminated.is_empty() {
                debug!(
                    started = summary.started.len(),
                    terminated = summary.terminated.len(),
                    notified = summary.notified,
                    "Cycle complete"
                );
            }
            stop.wait(interval);
        }
        self.persist();
        info!("ML monitor daemon stopped");
    }
}
