//! Integration tests for histq.
//!
//! These drive the built `histq` binary against a throwaway HISTQ_HOME.

use std::path::Path;
use std::process::{Command, Output};

fn histq(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_histq"))
        .args(args)
        .env("HISTQ_HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run histq")
}

fn write_config(home: &Path, body: &str) {
    std::fs::write(home.join("config.toml"), body).unwrap();
}

#[test]
fn test_config_path_uses_histq_home() {
    let home = tempfile::tempdir().unwrap();
    let output = histq(home.path(), &["config", "path"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        home.path().join("config.toml").display().to_string()
    );
}

#[test]
fn test_ask_no_words() {
    let home = tempfile::tempdir().unwrap();
    let output = histq(home.path(), &["ask"]);
    assert_eq!(output.status.code(), Some(1), "Expected exit code 1");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "Expected 'Usage' in stderr, got: {stderr}"
    );
}

#[test]
fn test_record_then_stats() {
    let home = tempfile::tempdir().unwrap();
    for (cmd, code) in [("git status", "0"), ("make", "2"), ("git status", "0")] {
        let output = histq(
            home.path(),
            &["record", "--command", cmd, "--cwd", "/src", "--exit-code", code],
        );
        assert!(output.status.success(), "{:?}", output);
    }
    let output = histq(home.path(), &["stats"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Total commands: 3"), "got: {stdout}");
    assert!(stdout.contains("Unique commands: 2"), "got: {stdout}");
    assert!(stdout.contains("1. git status (2)"), "got: {stdout}");
}

#[test]
fn test_ask_refused_when_disabled() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        "[ask]\nenabled = false\n\n[provider]\ndefault = \"ollama\"\n",
    );
    let output = histq(home.path(), &["ask", "what", "did", "I", "run?"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("histq:"), "got: {stderr}");
    assert!(stderr.contains("disabled"), "got: {stderr}");
}

#[test]
fn test_disabled_ask_needs_no_key_and_leaves_no_database() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), "[ask]\nenabled = false\n");
    let output = Command::new(env!("CARGO_BIN_EXE_histq"))
        .args(["ask", "what", "did", "I", "run?"])
        .env("HISTQ_HOME", home.path())
        .env_remove("RUST_LOG")
        .env_remove("OPENROUTER_API_KEY")
        .output()
        .expect("failed to run histq");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("disabled"), "got: {stderr}");
    assert!(!stderr.contains("API key"), "got: {stderr}");
    assert!(!home.path().join("history.db").exists());
}

#[test]
fn test_ask_reports_unreachable_provider() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        "[provider]\ndefault = \"ollama\"\ntimeout_seconds = 5\n\n\
         [provider.ollama]\nbase_url = \"http://127.0.0.1:9/v1\"\n",
    );
    let output = histq(home.path(), &["ask", "anything"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SQL generation"), "got: {stderr}");
}
