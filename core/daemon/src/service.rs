//! systemd unit generation for `--setup-service`.

use std::path::{Path, PathBuf};

use fs_err as fs;

pub const DEFAULT_UNIT_PATH: &str = "/etc/systemd/system/ml-monitor.service";
const FALLBACK_EXEC: &str = "/usr/local/bin/ml-monitor-daemon";

/// Renders the unit file. `exec_start` is the full command line, already quoted.
pub fn render_unit(exec_start: &str) -> String {
    format!(
        "[Unit]
Description=ML Process Monitor Daemon
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec_start}
Restart=on-failure
RestartSec=5
KillSignal=SIGTERM
StandardOutput=journal
StandardError=journal
SyslogIdentifier=ml-monitor

[Install]
WantedBy=multi-user.target
"
    )
}

/// Builds `ExecStart=` from the daemon binary and the flags it should run with.
pub fn exec_start(binary: &Path, args: &[String]) -> String {
    std::iter::once(binary.to_string_lossy().into_owned())
        .chain(args.iter().cloned())
        .map(|arg| quote(&arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path of the running binary, or the conventional install location.
pub fn daemon_binary() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from(FALLBACK_EXEC))
}

pub fn install_unit(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Quoting per systemd.service(5) "Command lines": `$` and `%` are expanded
/// even inside quotes, so they are doubled. A lone `;` separates commands.
fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg == ";"
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '%'));
    if !needs_quotes {
        return arg.to_string();
    }
    let escaped = arg
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "$$")
        .replace('%', "%%");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_contains_exec_start_and_restart_policy() {
        let unit = render_unit("/usr/local/bin/ml-monitor-daemon --check-interval 5");
        assert!(unit.contains("ExecStart=/usr/local/bin/ml-monitor-daemon --check-interval 5\n"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn exec_start_quotes_only_when_needed() {
        let line = exec_start(
            Path::new("/opt/ml monitor/ml-monitor-daemon"),
            &[
                "--ntfy-topic".to_string(),
                "phone_only".to_string(),
                "--state-file".to_string(),
                "/var/lib/x $y.json".to_string(),
            ],
        );
        assert_eq!(
            line,
            "\"/opt/ml monitor/ml-monitor-daemon\" --ntfy-topic phone_only --state-file \"/var/lib/x $$y.json\""
        );
    }

    #[test]
    fn plain_args_are_left_bare() {
        let line = exec_start(
            Path::new("/usr/local/bin/ml-monitor-daemon"),
            &["--ntfy-topic".to_string(), "a;b".to_string(), "50%".to_string()],
        );
        assert_eq!(
            line,
            "/usr/local/bin/ml-monitor-daemon --ntfy-topic a;b \"50%%\""
        );
        assert_eq!(quote(";"), "\";\"");
    }

    #[test]
    fn install_unit_creates_parent_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("systemd").join("ml-monitor.service");
        install_unit(&path, "unit").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "unit");
    }
}
