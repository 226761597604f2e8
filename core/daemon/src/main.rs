//! ml-monitor daemon entrypoint.
//!
//! Single-writer service: polls the process table, tracks top-level interpreter
//! processes, persists them to the state file, and sends an ntfy notification
//! when one ends. `--setup-service` writes a systemd unit and exits.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use ml_monitor_core::config::{DaemonConfig, DEFAULT_CONFIG_FILE};
use ml_monitor_core::{logging, IdentityFilter, NtfySink, NvidiaSmiReader, StateStore, SysinfoSource};
use tracing::{error, info};

mod monitor;
mod service;
mod signal;

use monitor::Monitor;
use signal::StopSignal;

#[derive(Parser, Debug)]
#[command(name = "ml-monitor-daemon")]
#[command(about = "ML process monitor daemon")]
#[command(version)]
struct Cli {
    /// ntfy server address (host, or base URL with scheme)
    #[arg(long, value_name = "SERVER")]
    ntfy_server: Option<String>,

    /// ntfy topic to publish to
    #[arg(long, value_name = "TOPIC")]
    ntfy_topic: Option<String>,

    /// How often to check for new/terminated processes (seconds)
    #[arg(long, value_name = "SECS")]
    check_interval: Option<u64>,

    /// File to store monitor state
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Log file ("-" for stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Process name to track (repeatable; replaces the configured set)
    #[arg(long = "target-name", value_name = "NAME")]
    target_names: Vec<String>,

    /// TOML config file; missing default file means built-in defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Create systemd service file and exit
    #[arg(long)]
    setup_service: bool,

    /// Where --setup-service writes the unit
    #[arg(long, value_name = "PATH", default_value = service::DEFAULT_UNIT_PATH)]
    unit_path: PathBuf,
}

impl Cli {
    fn resolve_config(&self) -> ml_monitor_core::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) if !path.exists() => {
                return Err(ml_monitor_core::MonitorError::InvalidConfig(format!(
                    "config file {} does not exist",
                    path.display()
                )))
            }
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::load(DEFAULT_CONFIG_FILE.as_ref())?,
        };

        if let Some(server) = &self.ntfy_server {
            config.notify.server = server.clone();
        }
        if let Some(topic) = &self.ntfy_topic {
            config.notify.topic = topic.clone();
        }
        if let Some(secs) = self.check_interval {
            config.monitor.check_interval_secs = secs;
        }
        if let Some(path) = &self.state_file {
            config.storage.state_file = path.clone();
        }
        if let Some(path) = &self.log_file {
            config.logging.file = path.clone();
        }
        if !self.target_names.is_empty() {
            config.monitor.target_names = self.target_names.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Flags that reproduce `config` when the unit starts the daemon.
fn service_args(config: &DaemonConfig, config_file: Option<&PathBuf>) -> Vec<String> {
    let mut args = vec![
        "--ntfy-server".to_string(),
        config.notify.server.clone(),
        "--ntfy-topic".to_string(),
        config.notify.topic.clone(),
        "--check-interval".to_string(),
        config.monitor.check_interval_secs.to_string(),
        "--state-file".to_string(),
        config.storage.state_file.display().to_string(),
        "--log-file".to_string(),
        config.logging.file.display().to_string(),
    ];
    for name in &config.monitor.target_names {
        args.push("--target-name".to_string());
        args.push(name.clone());
    }
    if let Some(path) = config_file {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args
}

fn setup_service(cli: &Cli, config: &DaemonConfig) {
    let exec = service::exec_start(
        &service::daemon_binary(),
        &service_args(config, cli.config.as_ref()),
    );
    let unit = service::render_unit(&exec);

    match service::install_unit(&cli.unit_path, &unit) {
        Ok(()) => {
            println!("Systemd service file created at {}", cli.unit_path.display());
            println!("Run the following commands to enable and start the service:");
            println!("  sudo systemctl daemon-reload");
            println!("  sudo systemctl enable ml-monitor");
            println!("  sudo systemctl start ml-monitor");
        }
        Err(err) => {
            println!("Failed to create service file {}: {}", cli.unit_path.display(), err);
            println!("You may need to run this with sudo privileges. Unit contents:");
            println!();
            print!("{unit}");
        }
    }
}

fn fatal(message: &str, err: &dyn std::fmt::Display) -> ! {
    error!(error = %err, "{message}");
    eprintln!("ml-monitor-daemon: {message}: {err}");
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ml-monitor-daemon: {err}");
            process::exit(1);
        }
    };

    if cli.setup_service {
        setup_service(&cli, &config);
        return;
    }

    let _logging_guard = match logging::init(config.log_file()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("ml-monitor-daemon: {err}");
            process::exit(1);
        }
    };

    let store = StateStore::new(&config.storage.state_file);
    if let Err(err) = store.ensure_parent_dir() {
        fatal("Failed to prepare state directory", &err);
    }

    let stop = StopSignal::new();
    if let Err(err) = stop.install() {
        fatal("Failed to install signal handler", &err);
    }

    let sink = NtfySink::new(&config.notify.server, &config.notify.topic);
    let filter = IdentityFilter::new(config.monitor.target_names.iter().cloned());
    info!(
        ntfy = %sink.url(),
        state_file = %store.path().display(),
        targets = ?config.monitor.target_names,
        "Configuration loaded"
    );

    let mut monitor = Monitor::new(
        SysinfoSource::new(),
        NvidiaSmiReader::default(),
        sink,
        filter,
        store,
    );
    monitor.resume();
    monitor.run(config.check_interval(), &stop);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("none.toml");
        fs_err::write(&missing, "").unwrap();
        let cli = Cli::parse_from([
            "ml-monitor-daemon",
            "--config",
            missing.to_str().unwrap(),
            "--ntfy-server",
            "ntfy.example.com",
            "--check-interval",
            "30",
            "--target-name",
            "julia",
            "--target-name",
            "python3",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.notify.server, "ntfy.example.com");
        assert_eq!(config.notify.topic, "phone_only");
        assert_eq!(config.monitor.check_interval_secs, 30);
        assert_eq!(config.monitor.target_names, vec!["julia", "python3"]);
    }

    #[test]
    fn explicit_missing_config_is_fatal() {
        let cli = Cli::parse_from(["ml-monitor-daemon", "--config", "/nonexistent/ml-monitor.toml"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("c.toml");
        fs_err::write(&path, "").unwrap();
        let cli = Cli::parse_from([
            "ml-monitor-daemon",
            "--config",
            path.to_str().unwrap(),
            "--check-interval",
            "0",
        ]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("c.toml");
        fs_err::write(&path, "").unwrap();
        let cli = Cli::parse_from([
            "ml-monitor-daemon",
            "--config",
            path.to_str().unwrap(),
            "--check-interval",
            "18446744073709551615",
        ]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn service_args_round_trip_through_cli() {
        let mut config = DaemonConfig::default();
        config.notify.server = "ntfy.example.com".to_string();
        config.monitor.check_interval_secs = 7;
        let args = service_args(&config, None);

        let cli = Cli::parse_from(std::iter::once("ml-monitor-daemon".to_string()).chain(args));
        assert_eq!(cli.ntfy_server.as_deref(), Some("ntfy.example.com"));
        assert_eq!(cli.check_interval, Some(7));
        assert_eq!(cli.target_names, vec!["python", "python3"]);
    }
}
