//! # ml-monitor-core
//!
//! Core library for ml-monitor: tracks long-running interpreter processes
//! (training jobs, notebooks, batch scripts), persists them across daemon
//! restarts, and reports when they end.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Each binary runs one cooperative loop.
//! - **Single writer**: Only the daemon calls [`StateStore::save`]; viewers only load.
//! - **Graceful degradation**: Collaborator failures (process enumeration,
//!   nvidia-smi, ntfy) degrade to "no data" and never abort a poll.
//! - **Narrow seams**: The OS, the GPU query and the notification transport sit
//!   behind [`ProcessSource`], [`AcceleratorReader`] and [`NotificationSink`].
//!
//! ## Pipeline
//!
//! ```text
//! ProcessSource → IdentityFilter → LifecycleTracker → StateStore (save)
//!                                        └──────────→ NotificationSink (on termination)
//!
//! StateStore (load) → LiveMetricsSource → ViewModel (sort/filter) → ml-monitor-ui
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod gpu;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod process;
pub mod store;
pub mod tracker;
pub mod types;
pub mod view;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::DaemonConfig;
pub use error::{MonitorError, Result};
pub use filter::IdentityFilter;
pub use gpu::{AcceleratorReader, AcceleratorSample, NoAccelerator, NvidiaSmiReader};
pub use metrics::{LiveMetrics, LiveMetricsSource, SysinfoMetrics};
pub use notify::{NotificationSink, NtfySink};
pub use process::{ProcessInfo, ProcessSnapshot, ProcessSource, SysinfoSource};
pub use store::StateStore;
pub use tracker::{deliver_terminations, CycleReport, LifecycleTracker, Termination};
pub use types::{format_duration, AuxMetrics, TrackedEntry, TrackedSet};
pub use view::{ProcessRow, SortKey, ViewCommand, ViewModel, ViewOptions};
