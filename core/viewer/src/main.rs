//! ml-monitor-ui: terminal table of processes tracked by the daemon.
//!
//! Read-only. Loads the daemon's state file every refresh interval and joins it
//! with live CPU, memory and GPU readings.

use std::io;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ml_monitor_core::config::{DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_STATE_FILE, MAX_INTERVAL_SECS};
use ml_monitor_core::{logging, LiveMetricsSource, NvidiaSmiReader, StateStore, SysinfoMetrics};
use ratatui::{backend::CrosstermBackend, Terminal};

mod app;
mod ui;

use app::{action_for, App};

#[derive(Parser, Debug)]
#[command(name = "ml-monitor-ui")]
#[command(about = "ML Process Monitor UI")]
#[command(version)]
struct Cli {
    /// State file written by ml-monitor-daemon
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// Seconds between refreshes
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_REFRESH_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS)
    )]
    refresh_interval: u64,

    /// Write diagnostics to this file (off by default; the terminal is in use)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let _logging_guard = match cli.log_file.as_deref().map(logging::init_file).transpose() {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("ml-monitor-ui: {err}");
            process::exit(1);
        }
    };
    tracing::info!(state_file = %cli.state_file.display(), "Viewer started");

    let mut app = App::new(
        StateStore::new(&cli.state_file),
        SysinfoMetrics::new(NvidiaSmiReader::default().with_utilization()),
        Duration::from_secs(cli.refresh_interval),
    );

    if let Err(err) = run(&mut app) {
        tracing::error!(error = %err, "Viewer terminated with error");
        eprintln!("ml-monitor-ui: {err}");
        process::exit(1);
    }
}

fn run<M: LiveMetricsSource>(app: &mut App<M>) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app<M: LiveMetricsSource>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<M>,
) -> io::Result<()> {
    loop {
        app.tick(Instant::now());
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(app.poll_timeout(Instant::now()))? {
            if let Event::Key(key) = event::read()? {
                if let Some(action) = action_for(key) {
                    app.handle(action);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
