//! Cooperative shutdown.
//!
//! SIGINT, SIGTERM and SIGHUP (the `ctrlc` "termination" set) all request the
//! same stop. The flag is checked between polls, so the tick in flight always
//! finishes and the final persisted state is consistent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns `true` only for the first request.
    pub fn request(&self) -> bool {
        !self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `timeout` or until a stop is requested. Returns `true` if stopped.
    /// A timeout past the clock's range waits until a stop is requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.is_requested() {
                return true;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };
            thread::sleep(slice);
        }
    }

    /// Routes termination signals to this flag. Can only be installed once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            if signal.request() {
                tracing::info!("Stop requested; finishing current poll");
            } else {
                tracing::debug!("Stop already requested");
            }
        })
    }
}
