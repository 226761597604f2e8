//! Viewer state and key handling, independent of the terminal.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ml_monitor_core::config::MAX_INTERVAL_SECS;
use ml_monitor_core::{LiveMetricsSource, ProcessRow, StateStore, ViewCommand, ViewModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    View(ViewCommand),
}

pub fn action_for(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char('s') => Some(Action::View(ViewCommand::CycleSort)),
        KeyCode::Char('r') => Some(Action::View(ViewCommand::ToggleDirection)),
        KeyCode::Char('a') => Some(Action::View(ViewCommand::ToggleShowTerminated)),
        KeyCode::F(5) => Some(Action::View(ViewCommand::Refresh)),
        _ => None,
    }
}

pub struct App<M> {
    pub model: ViewModel,
    metrics: M,
    refresh_interval: Duration,
    next_refresh: Instant,
    pub should_quit: bool,
}

impl<M: LiveMetricsSource> App<M> {
    pub fn new(store: StateStore, metrics: M, refresh_interval: Duration) -> Self {
        Self {
            model: ViewModel::new(store),
            metrics,
            refresh_interval,
            next_refresh: Instant::now(),
            should_quit: false,
        }
    }

    /// Refreshes when the interval has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if now >= self.next_refresh {
            self.refresh_now(now, Utc::now());
        }
    }

    pub fn refresh_now(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.model.refresh(&mut self.metrics, wall);
        self.next_refresh = now
            .checked_add(self.refresh_interval)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_INTERVAL_SECS));
    }

    /// Time until the next scheduled refresh.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        self.next_refresh.saturating_duration_since(now)
    }

    pub fn handle(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::View(ViewCommand::Refresh) => self.refresh_now(Instant::now(), Utc::now()),
            Action::View(command) => self.model.apply(command, &self.metrics),
        }
    }

    pub fn rows(&self) -> &[ProcessRow] {
        self.model.rows()
    }
}

/// Shortens `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
