//! Fake collaborators for tests. Enabled for this crate's unit tests and, via the
//! `test-helpers` feature, for the daemon's tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::gpu::{AcceleratorReader, AcceleratorSample};
use crate::notify::NotificationSink;
use crate::process::{ProcessInfo, ProcessSnapshot, ProcessSource};

/// Replays scripted snapshots, then keeps returning the last one.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    polls: VecDeque<Vec<ProcessInfo>>,
    last: Vec<ProcessInfo>,
}

impl ScriptedSource {
    pub fn new(polls: impl IntoIterator<Item = Vec<ProcessInfo>>) -> Self {
        Self {
            polls: polls.into_iter().collect(),
            last: Vec::new(),
        }
    }
}

impl ProcessSource for ScriptedSource {
    fn snapshot(&mut self) -> ProcessSnapshot {
        if let Some(next) = self.polls.pop_front() {
            self.last = next;
        }
        ProcessSnapshot::new(self.last.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedReader(pub AcceleratorSample);

impl AcceleratorReader for FixedReader {
    fn sample(&self) -> AcceleratorSample {
        self.0.clone()
    }
}

/// Records every delivery; answers with a fixed result.
#[derive(Debug, Default)]
pub struct RecordingSink {
    succeed: bool,
    deliveries: RefCell<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            deliveries: RefCell::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            deliveries: RefCell::default(),
        }
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.borrow().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, title: &str, body: &str) -> bool {
        self.deliveries
            .borrow_mut()
            .push((title.to_string(), body.to_string()));
        self.succeed
    }
}

pub fn process(
    pid: u32,
    name: &str,
    parent_pid: Option<u32>,
    owner: &str,
    command_line: &str,
    created_at: DateTime<Utc>,
) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        parent_pid,
        owner: owner.to_string(),
        command_line: command_line.to_string(),
        created_at,
    }
}
