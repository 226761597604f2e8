//! Live per-process metrics for the viewer.

use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

use crate::gpu::{AcceleratorReader, AcceleratorSample};

/// Start times may be recorded with sub-second precision by older daemons;
/// sysinfo reports whole seconds.
const START_TIME_TOLERANCE_SECS: i64 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveMetrics {
    pub running: bool,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub status: String,
    pub sleeping: bool,
    pub gpu_memory_mib: Option<u64>,
    pub gpu_utilization_percent: Option<u32>,
}

impl LiveMetrics {
    pub fn not_running() -> Self {
        Self {
            running: false,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            status: "terminated".to_string(),
            sleeping: false,
            gpu_memory_mib: None,
            gpu_utilization_percent: None,
        }
    }
}

pub trait LiveMetricsSource {
    /// Takes a fresh sample. Called once per viewer tick.
    fn refresh(&mut self);

    /// Metrics for `pid`, or [`LiveMetrics::not_running`] if it no longer
    /// resolves to the process that started at `started_at`.
    fn metrics(&self, pid: u32, started_at: DateTime<Utc>) -> LiveMetrics;
}

pub struct SysinfoMetrics<P: AcceleratorReader> {
    system: System,
    reader: P,
    accelerator: AcceleratorSample,
}

impl<P: AcceleratorReader> SysinfoMetrics<P> {
    pub fn new(reader: P) -> Self {
        Self {
            system: System::new(),
            reader,
            accelerator: AcceleratorSample::default(),
        }
    }
}

impl<P: AcceleratorReader> LiveMetricsSource for SysinfoMetrics<P> {
    fn refresh(&mut self) {
        self.system.refresh_memory();
        // CPU usage is computed against the previous refresh, so the first
        // sample after startup reads 0%.
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cpu().with_memory());
        self.accelerator = self.reader.sample();
    }

    fn metrics(&self, pid: u32, started_at: DateTime<Utc>) -> LiveMetrics {
        let Some(process) = self.system.process(Pid::from_u32(pid)) else {
            return LiveMetrics::not_running();
        };
        if (process.start_time() as i64 - started_at.timestamp()).abs() > START_TIME_TOLERANCE_SECS {
            // Pid reused by an unrelated process.
            return LiveMetrics::not_running();
        }

        let total_memory = self.system.total_memory();
        let memory_percent = if total_memory == 0 {
            0.0
        } else {
            (process.memory() as f64 / total_memory as f64 * 100.0) as f32
        };
        let status = process.status();

        LiveMetrics {
            running: true,
            cpu_percent: process.cpu_usage(),
            memory_percent,
            status: status.to_string(),
            sleeping: matches!(status, ProcessStatus::Sleep | ProcessStatus::Idle),
            gpu_memory_mib: self.accelerator.memory_mib(pid),
            gpu_utilization_percent: self.accelerator.utilization_percent(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::NoAccelerator;

    #[test]
    fn current_process_is_running() {
        let mut source = SysinfoMetrics::new(NoAccelerator);
        source.refresh();
        let me = std::process::id();
        let started = source
            .system
            .process(Pid::from_u32(me))
            .map(|p| p.start_time())
            .unwrap();
        let started_at = DateTime::from_timestamp(started as i64, 0).unwrap();
        let metrics = source.metrics(me, started_at);
        assert!(metrics.running);
        assert!(metrics.memory_percent >= 0.0);
    }

    #[test]
    fn accelerator_readings_are_attached() {
        let me = std::process::id();
        let sample = AcceleratorSample::new([(me, 512)]).with_utilization([(me, 40)]);
        let mut source = SysinfoMetrics::new(crate::testing::FixedReader(sample));
        source.refresh();
        let started = source
            .system
            .process(Pid::from_u32(me))
            .map(|p| p.start_time())
            .unwrap();
        let started_at = DateTime::from_timestamp(started as i64, 0).unwrap();
        let metrics = source.metrics(me, started_at);
        assert_eq!(metrics.gpu_memory_mib, Some(512));
        assert_eq!(metrics.gpu_utilization_percent, Some(40));
    }

    #[test]
    fn reused_pid_is_not_running() {
        let mut source = SysinfoMetrics::new(NoAccelerator);
        source.refresh();
        let long_ago = DateTime::from_timestamp(0, 0).unwrap();
        assert!(!source.metrics(std::process::id(), long_ago).running);
    }

    #[test]
    fn unknown_pid_is_not_running() {
        let mut source = SysinfoMetrics::new(NoAccelerator);
        source.refresh();
        assert_eq!(source.metrics(u32::MAX - 1, Utc::now()), LiveMetrics::not_running());
    }
}
