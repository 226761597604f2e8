//! Target-process identification.
//!
//! A target is a process whose name is in the configured set, that is not the
//! monitor itself, and whose parent is not also a target. The parent rule keeps
//! tracking scoped to top-level invocations: dataloader workers and
//! multiprocessing children of a tracked interpreter are never tracked.

use std::collections::BTreeSet;

use crate::process::{ProcessInfo, ProcessSnapshot};

pub const DEFAULT_TARGET_NAMES: &[&str] = &["python", "python3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFilter {
    target_names: BTreeSet<String>,
}

impl Default for IdentityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_NAMES.iter().copied())
    }
}

impl IdentityFilter {
    pub fn new<I, S>(target_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_names: target_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.target_names.iter().map(String::as_str)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.target_names.contains(name)
    }

    /// Decides whether `candidate` should be tracked.
    ///
    /// A parent that is missing from the snapshot (already exited, or skipped
    /// because it could not be inspected) counts as a non-target parent.
    pub fn accept(&self, candidate: &ProcessInfo, snapshot: &ProcessSnapshot, self_pid: u32) -> bool {
        if candidate.pid == self_pid {
            return false;
        }
        if !self.matches_name(&candidate.name) {
            return false;
        }
        match snapshot.parent_of(candidate) {
            Some(parent) => !self.matches_name(&parent.name),
            None => true,
        }
    }

    /// Every process in `snapshot` that passes [`IdentityFilter::accept`].
    pub fn qualifying<'a>(&self, snapshot: &'a ProcessSnapshot, self_pid: u32) -> Vec<&'a ProcessInfo> {
        snapshot
            .iter()
            .filter(|process| self.accept(process, snapshot, self_pid))
            .collect()
    }
}
