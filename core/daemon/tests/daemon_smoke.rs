use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Option<Child>,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn daemon() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ml-monitor-daemon"))
}

fn empty_config(home: &Path) -> PathBuf {
    let path = home.join("config.toml");
    std::fs::write(&path, "").expect("Failed to write config");
    path
}

fn run(args: &[&str]) -> Output {
    daemon()
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run ml-monitor-daemon")
}

fn wait_for_file(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for {}", path.display());
}

#[test]
fn setup_service_writes_unit_and_exits_zero() {
    let temp = TempDir::new().unwrap();
    let config = empty_config(temp.path());
    let unit = temp.path().join("units").join("ml-monitor.service");

    let output = run(&[
        "--config",
        config.to_str().unwrap(),
        "--setup-service",
        "--unit-path",
        unit.to_str().unwrap(),
        "--ntfy-server",
        "ntfy.example.com",
        "--check-interval",
        "15",
    ]);

    assert!(output.status.success());
    let content = std::fs::read_to_string(&unit).expect("unit file written");
    assert!(content.contains("ExecStart="));
    assert!(content.contains("--ntfy-server ntfy.example.com"));
    assert!(content.contains("--check-interval 15"));
    assert!(content.contains("WantedBy=multi-user.target"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("systemctl enable ml-monitor"));
}

#[test]
fn zero_check_interval_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = empty_config(temp.path());
    let output = run(&[
        "--config",
        config.to_str().unwrap(),
        "--check-interval",
        "0",
        "--log-file",
        "-",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("check interval"));
}

#[test]
fn explicit_missing_config_is_rejected() {
    let output = run(&["--config", "/nonexistent/ml-monitor/config.toml", "--log-file", "-"]);
    assert!(!output.status.success());
}

#[cfg(unix)]
#[test]
fn daemon_persists_state_and_stops_on_sigterm() {
    let temp = TempDir::new().unwrap();
    let config = empty_config(temp.path());
    let state = temp.path().join("state").join("state.json");

    let child = daemon()
        .args([
            "--config",
            config.to_str().unwrap(),
            "--state-file",
            state.to_str().unwrap(),
            "--log-file",
            "-",
            "--ntfy-server",
            "http://127.0.0.1:9",
            "--check-interval",
            "1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn ml-monitor-daemon");
    let mut guard = DaemonGuard { child: Some(child) };
    let pid = guard.child.as_ref().unwrap().id();

    wait_for_file(&state, Duration::from_secs(10));
    let content = std::fs::read_to_string(&state).unwrap();
    assert!(looks_like_json_object(&content), "unexpected state: {content}");

    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let mut child = guard.child.take().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("daemon did not stop after SIGTERM");
        }
        sleep(Duration::from_millis(50));
    };
    assert!(exit.success());
    assert!(state.exists());
}

fn looks_like_json_object(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}
