//! Accelerator (GPU) usage lookup.
//!
//! One `nvidia-smi` query per tick covers every process, so the reader returns a
//! whole-table [`AcceleratorSample`] and callers look pids up in it. The viewer
//! adds a `pmon` call for utilization. Any failure
//! (binary missing, driver error, unparseable output) degrades to an empty
//! sample.

use std::collections::HashMap;
use std::process::Command;

use serde_json::Value;

use crate::types::{AuxMetrics, GPU_MEMORY_KEY};

/// Per-pid accelerator usage at one instant: memory in MiB and, when sampled,
/// streaming-multiprocessor utilization in percent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorSample {
    memory_mib: HashMap<u32, u64>,
    utilization_percent: HashMap<u32, u32>,
}

impl AcceleratorSample {
    pub fn new(memory_mib: impl IntoIterator<Item = (u32, u64)>) -> Self {
        Self {
            memory_mib: memory_mib.into_iter().collect(),
            utilization_percent: HashMap::new(),
        }
    }

    pub fn with_utilization(mut self, utilization: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.utilization_percent = utilization.into_iter().collect();
        self
    }

    pub fn memory_mib(&self, pid: u32) -> Option<u64> {
        self.memory_mib.get(&pid).copied()
    }

    pub fn utilization_percent(&self, pid: u32) -> Option<u32> {
        self.utilization_percent.get(&pid).copied()
    }

    /// The opaque payload stored on a tracked entry. `None` means "no data",
    /// which is different from a process using zero MiB.
    pub fn query_usage(&self, pid: u32) -> Option<AuxMetrics> {
        let used = self.memory_mib(pid)?;
        let mut metrics = AuxMetrics::new();
        metrics.insert(GPU_MEMORY_KEY.to_string(), Value::from(used));
        Some(metrics)
    }

    pub fn is_empty(&self) -> bool {
        self.memory_mib.is_empty()
    }
}

pub trait AcceleratorReader {
    fn sample(&self) -> AcceleratorSample;
}

/// Reader for hosts without accelerators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccelerator;

impl AcceleratorReader for NoAccelerator {
    fn sample(&self) -> AcceleratorSample {
        AcceleratorSample::default()
    }
}

#[derive(Debug, Clone)]
pub struct NvidiaSmiReader {
    binary: String,
    utilization: bool,
}

impl Default for NvidiaSmiReader {
    fn default() -> Self {
        Self::with_binary("nvidia-smi")
    }
}

impl NvidiaSmiReader {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            utilization: false,
        }
    }

    /// Also samples per-process utilization (`nvidia-smi pmon`), one extra
    /// call per tick. The daemon only records memory; the viewer shows both.
    pub fn with_utilization(mut self) -> Self {
        self.utilization = true;
        self
    }

    fn run(&self, args: &[&str]) -> Option<String> {
        let output = match Command::new(&self.binary).args(args).output() {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!(error = %err, binary = %self.binary, "GPU query unavailable");
                return None;
            }
        };
        if !output.status.success() {
            tracing::debug!(status = %output.status, ?args, "GPU query failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl AcceleratorReader for NvidiaSmiReader {
    fn sample(&self) -> AcceleratorSample {
        let Some(csv) = self.run(&[
            "--query-compute-apps=pid,used_memory",
            "--format=csv,noheader,nounits",
        ]) else {
            return AcceleratorSample::default();
        };
        let sample = parse_compute_apps(&csv);
        if !self.utilization || sample.is_empty() {
            return sample;
        }
        match self.run(&["pmon", "--count", "1", "--select", "u"]) {
            Some(pmon) => sample.with_utilization(parse_pmon(&pmon)),
            None => sample,
        }
    }
}

/// Parses `pid, used_memory` CSV rows. Rows that do not parse are skipped;
/// a pid listed on several GPUs has its usage summed.
pub fn parse_compute_apps(csv: &str) -> AcceleratorSample {
    let mut memory_mib: HashMap<u32, u64> = HashMap::new();
    for line in csv.lines() {
        let mut parts = line.split(',').map(str::trim);
        let Some(pid) = parts.next().and_then(|p| p.parse::<u32>().ok()) else {
            continue;
        };
        let Some(used) = parts
            .next()
            .map(|value| value.trim_end_matches("MiB").trim())
            .and_then(|value| value.parse::<u64>().ok())
        else {
            continue;
        };
        let total = memory_mib.entry(pid).or_default();
        *total = total.saturating_add(used);
    }
    AcceleratorSample::new(memory_mib)
}

/// Parses `nvidia-smi pmon -s u` rows (`gpu pid type sm mem enc dec ...`) into
/// per-pid SM utilization. `#` header lines and `-` readings are skipped; a pid
/// on several GPUs keeps its highest reading.
pub fn parse_pmon(text: &str) -> HashMap<u32, u32> {
    let mut utilization: HashMap<u32, u32> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(pid), Some(sm)) = (
            fields.get(1).and_then(|p| p.parse::<u32>().ok()),
            fields.get(3).and_then(|v| v.parse::<u32>().ok()),
        ) else {
            continue;
        };
        let entry = utilization.entry(pid).or_default();
        *entry = (*entry).max(sm.min(100));
    }
    utilization
}
