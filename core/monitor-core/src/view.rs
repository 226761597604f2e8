//! Viewer model: reads the state file, enriches entries with live metrics, and
//! sorts/filters them for display. Rendering lives in the `ml-monitor-ui` binary.
//!
//! The viewer never writes the state file. A load that fails (usually a torn
//! read while the daemon replaces the file) keeps the previous rows.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::metrics::{LiveMetrics, LiveMetricsSource};
use crate::store::StateStore;
use crate::types::{TrackedEntry, TrackedSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Cpu,
    Memory,
    Time,
    Gpu,
}

impl SortKey {
    pub fn next(self) -> Self {
        match self {
            SortKey::Cpu => SortKey::Memory,
            SortKey::Memory => SortKey::Time,
            SortKey::Time => SortKey::Gpu,
            SortKey::Gpu => SortKey::Cpu,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Cpu => "cpu",
            SortKey::Memory => "memory",
            SortKey::Time => "time",
            SortKey::Gpu => "gpu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    pub sort_key: SortKey,
    pub descending: bool,
    pub show_terminated: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            sort_key: SortKey::Cpu,
            descending: true,
            show_terminated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    CycleSort,
    ToggleDirection,
    ToggleShowTerminated,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: u32,
    pub entry: TrackedEntry,
    pub metrics: LiveMetrics,
}

impl ProcessRow {
    /// Live reading when available, otherwise the daemon's last recorded value.
    pub fn gpu_memory_mib(&self) -> Option<u64> {
        self.metrics
            .gpu_memory_mib
            .or_else(|| self.entry.gpu_memory_mib())
    }
}

/// Enriches, filters and sorts `entries`.
pub fn build_rows<M>(entries: &TrackedSet, metrics: &M, options: &ViewOptions) -> Vec<ProcessRow>
where
    M: LiveMetricsSource + ?Sized,
{
    let mut rows: Vec<ProcessRow> = entries
        .iter()
        .map(|(pid, entry)| ProcessRow {
            pid: *pid,
            entry: entry.clone(),
            metrics: metrics.metrics(*pid, entry.started_at),
        })
        .filter(|row| options.show_terminated || row.metrics.running)
        .collect();
    sort_rows(&mut rows, options);
    rows
}

pub fn sort_rows(rows: &mut [ProcessRow], options: &ViewOptions) {
    rows.sort_by(|a, b| {
        let ordering = compare(a, b, options.sort_key).then_with(|| a.pid.cmp(&b.pid));
        if options.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare(a: &ProcessRow, b: &ProcessRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Cpu => a.metrics.cpu_percent.total_cmp(&b.metrics.cpu_percent),
        SortKey::Memory => a.metrics.memory_percent.total_cmp(&b.metrics.memory_percent),
        // Longer-running sorts higher, i.e. earlier start time.
        SortKey::Time => b.entry.started_at.cmp(&a.entry.started_at),
        SortKey::Gpu => a
            .gpu_memory_mib()
            .unwrap_or(0)
            .cmp(&b.gpu_memory_mib().unwrap_or(0)),
    }
}

pub struct ViewModel {
    store: StateStore,
    options: ViewOptions,
    entries: TrackedSet,
    rows: Vec<ProcessRow>,
    last_error: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl ViewModel {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            options: ViewOptions::default(),
            entries: TrackedSet::new(),
            rows: Vec::new(),
            last_error: None,
            refreshed_at: None,
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn rows(&self) -> &[ProcessRow] {
        &self.rows
    }

    /// Error from the most recent load, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Reloads the state file and resamples live metrics.
    pub fn refresh<M: LiveMetricsSource + ?Sized>(&mut self, metrics: &mut M, now: DateTime<Utc>) {
        match self.store.load() {
            Ok(entries) => {
                self.entries = entries;
                self.last_error = None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "State file unreadable; keeping previous rows");
                self.last_error = Some(err.to_string());
                return;
            }
        }
        metrics.refresh();
        self.rows = build_rows(&self.entries, &*metrics, &self.options);
        self.refreshed_at = Some(now);
    }

    /// Applies a key command. Option changes regroup the current rows; an
    /// explicit refresh is left to the caller.
    pub fn apply<M: LiveMetricsSource + ?Sized>(&mut self, command: ViewCommand, metrics: &M) {
        match command {
            ViewCommand::CycleSort => self.options.sort_key = self.options.sort_key.next(),
            ViewCommand::ToggleDirection => self.options.descending = !self.options.descending,
            ViewCommand::ToggleShowTerminated => {
                self.options.show_terminated = !self.options.show_terminated
            }
            ViewCommand::Refresh => return,
        }
        self.rows = build_rows(&self.entries, metrics, &self.options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMetrics {
        by_pid: HashMap<u32, LiveMetrics>,
        refreshes: usize,
    }

    impl FakeMetrics {
        fn with(mut self, pid: u32, cpu: f32, mem: f32, gpu: Option<u64>) -> Self {
            self.by_pid.insert(
                pid,
                LiveMetrics {
                    running: true,
                    cpu_percent: cpu,
                    memory_percent: mem,
                    status: "Runnable".to_string(),
                    sleeping: false,
                    gpu_memory_mib: gpu,
                    gpu_utilization_percent: None,
                },
            );
            self
        }
    }

    impl LiveMetricsSource for FakeMetrics {
        fn refresh(&mut self) {
            self.refreshes += 1;
        }

        fn metrics(&self, pid: u32, _started_at: DateTime<Utc>) -> LiveMetrics {
            self.by_pid
                .get(&pid)
                .cloned()
                .unwrap_or_else(LiveMetrics::not_running)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
    }

    fn entry(minutes_ago: i64) -> TrackedEntry {
        TrackedEntry {
            command_line: "python job.py".to_string(),
            started_at: t0() - Duration::minutes(minutes_ago),
            owner: "al".to_string(),
            last_checked_at: t0(),
            aux_metrics: None,
        }
    }

    fn entries() -> TrackedSet {
        TrackedSet::from([(1, entry(10)), (2, entry(60)), (3, entry(5)), (4, entry(1))])
    }

    fn metrics() -> FakeMetrics {
        FakeMetrics::default()
            .with(1, 50.0, 1.0, Some(100))
            .with(2, 10.0, 9.0, None)
            .with(3, 90.0, 4.0, Some(4000))
        // pid 4 is gone
    }

    fn pids(rows: &[ProcessRow]) -> Vec<u32> {
        rows.iter().map(|r| r.pid).collect()
    }

    #[test]
    fn default_sort_is_cpu_descending_without_terminated() {
        let rows = build_rows(&entries(), &metrics(), &ViewOptions::default());
        assert_eq!(pids(&rows), vec![3, 1, 2]);
    }

    #[test]
    fn sort_keys_and_direction() {
        let mut options = ViewOptions {
            sort_key: SortKey::Memory,
            descending: true,
            show_terminated: false,
        };
        assert_eq!(pids(&build_rows(&entries(), &metrics(), &options)), vec![2, 3, 1]);

        options.sort_key = SortKey::Time;
        assert_eq!(pids(&build_rows(&entries(), &metrics(), &options)), vec![2, 1, 3]);

        options.sort_key = SortKey::Gpu;
        assert_eq!(pids(&build_rows(&entries(), &metrics(), &options)), vec![3, 1, 2]);

        options.descending = false;
        assert_eq!(pids(&build_rows(&entries(), &metrics(), &options)), vec![2, 1, 3]);
    }

    #[test]
    fn gpu_sort_falls_back_to_recorded_usage() {
        let mut set = entries();
        set.get_mut(&2).unwrap().aux_metrics =
            serde_json::json!({ "used_memory_mib": 9000 }).as_object().cloned();
        let options = ViewOptions {
            sort_key: SortKey::Gpu,
            ..ViewOptions::default()
        };
        assert_eq!(pids(&build_rows(&set, &metrics(), &options)), vec![2, 3, 1]);
    }

    #[test]
    fn show_terminated_keeps_dead_rows() {
        let options = ViewOptions {
            show_terminated: true,
            ..ViewOptions::default()
        };
        let rows = build_rows(&entries(), &metrics(), &options);
        assert_eq!(rows.len(), 4);
        let dead = rows.iter().find(|r| r.pid == 4).unwrap();
        assert!(!dead.metrics.running);
    }

    #[test]
    fn sort_key_cycles_through_all_keys() {
        let mut key = SortKey::Cpu;
        let mut seen = vec![key.label()];
        for _ in 0..3 {
            key = key.next();
            seen.push(key.label());
        }
        assert_eq!(seen, vec!["cpu", "memory", "time", "gpu"]);
        assert_eq!(key.next(), SortKey::Cpu);
    }

    #[test]
    fn view_model_keeps_rows_on_torn_read() {
        let temp = tempfile::tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.save(&entries()).unwrap();

        let mut model = ViewModel::new(store.clone());
        let mut live = metrics();
        model.refresh(&mut live, t0());
        assert_eq!(pids(model.rows()), vec![3, 1, 2]);
        assert!(model.last_error().is_none());

        std::fs::write(store.path(), "{\"1\": {").unwrap();
        model.refresh(&mut live, t0() + Duration::seconds(1));
        assert_eq!(pids(model.rows()), vec![3, 1, 2]);
        assert!(model.last_error().is_some());
        assert_eq!(model.refreshed_at(), Some(t0()));
        assert_eq!(live.refreshes, 1);

        store.save(&TrackedSet::new()).unwrap();
        model.refresh(&mut live, t0() + Duration::seconds(2));
        assert!(model.rows().is_empty());
        assert!(model.last_error().is_none());
    }

    #[test]
    fn view_model_never_writes_state() {
        let temp = tempfile::tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let mut model = ViewModel::new(store.clone());
        model.refresh(&mut metrics(), t0());
        assert!(!store.path().exists());
    }

    #[test]
    fn apply_regroups_current_rows() {
        let temp = tempfile::tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.save(&entries()).unwrap();
        let mut model = ViewModel::new(store);
        let mut live = metrics();
        model.refresh(&mut live, t0());

        model.apply(ViewCommand::ToggleShowTerminated, &live);
        assert_eq!(model.rows().len(), 4);
        model.apply(ViewCommand::ToggleDirection, &live);
        assert_eq!(model.rows()[0].pid, 4);
        model.apply(ViewCommand::CycleSort, &live);
        assert_eq!(model.options().sort_key, SortKey::Memory);
        model.apply(ViewCommand::Refresh, &live);
        assert_eq!(live.refreshes, 1);
    }
}
