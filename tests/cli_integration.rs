//! Integration tests for the `claude-watch` binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use claude_watch::session::LogLayout;
use tempfile::TempDir;

fn claude_watch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_claude-watch"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run_hook(dir: &TempDir, input: &str, extra: &[&str]) -> Output {
    let mut child = claude_watch()
        .arg("hook")
        .args(extra)
        .env("CLAUDE_WATCH_DIR", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn claude-watch");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("Failed to wait for claude-watch")
}

#[test]
fn test_version_flag() {
    for flag in ["-v", "--version"] {
        let output = claude_watch().arg(flag).output().unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.starts_with("claude-watch "), "got: {stdout}");
    }
}

#[test]
fn test_help_lists_commands() {
    let output = claude_watch().arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "sessions", "hook", "--verbose"] {
        assert!(stdout.contains(command), "Expected {command} in help");
    }
}

#[test]
fn test_run_help_flags() {
    let output = claude_watch().args(["run", "--help"]).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--skip-check"));
    assert!(stdout.contains("--raw"));
    assert!(stdout.contains("--json"));
}

#[test]
fn test_hook_appends_record() {
    let dir = TempDir::new().unwrap();
    let output = run_hook(
        &dir,
        r#"{"hook_event_name":"SessionStart","session_id":"cli-1","source":"startup"}"#,
        &[],
    );
    assert!(output.status.success());

    let layout = LogLayout::new(dir.path());
    let log = std::fs::read_to_string(layout.hook_log("cli-1")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"timestamp\""));
    assert!(layout.metadata("cli-1").exists());
}

#[cfg(unix)]
#[test]
fn test_hook_mirrors_blocking_exit_code() {
    let dir = TempDir::new().unwrap();
    let output = run_hook(
        &dir,
        r#"{"hook_event_name":"PostToolUse","session_id":"cli-2","tool_name":"Bash"}"#,
        &["--", "sh", "-c", "echo denied >&2; exit 2"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("denied"));

    let log = std::fs::read_to_string(LogLayout::new(dir.path()).hook_log("cli-2")).unwrap();
    assert!(log.contains("\"hookExitCode\":2"));
}

#[test]
fn test_hook_rejects_garbage_without_blocking() {
    let dir = TempDir::new().unwrap();
    let output = run_hook(&dir, "not json", &[]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_sessions_lists_nothing_in_empty_dir() {
    let dir = TempDir::new().unwrap();
    let output = claude_watch()
        .arg("sessions")
        .env("CLAUDE_WATCH_DIR", dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No active sessions"));
}
