//! Integration tests for the xpost-creds CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated config + database with simulated platforms only
struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("data")
            .join("posts.db")
            .to_string_lossy()
            .replace('\\', "/");
        let config_path = temp_dir.path().join("config.toml");

        let config_content = format!(
            r#"
[database]
path = "{}"

[simulated]
platforms = ["twitter", "tiktok"]
latency_ms = 0
failure_rate = 0.0
"#,
            db_path
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("xpost-creds").unwrap();
        cmd.env("XPOST_CONFIG", &self.config_path);
        cmd.env_remove("XPOST_TOKEN");
        cmd.env_remove("XPOST_USER");
        cmd
    }
}

fn status_line<'a>(stdout: &'a str, platform: &str) -> &'a str {
    stdout
        .lines()
        .find(|l| l.starts_with(platform))
        .unwrap_or_else(|| panic!("no status line for {}", platform))
}

#[test]
fn test_connect_then_status() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "twitter", "--token", "tw-token", "--provider-user-id", "tw-1", "-u", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected twitter for alice"));

    let output = env.cmd().args(["status", "-u", "alice"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(!status_line(&stdout, "twitter").contains("not connected"));
    assert!(status_line(&stdout, "twitter").contains("connected"));
    assert!(status_line(&stdout, "tiktok").contains("not connected"));
    assert!(status_line(&stdout, "facebook").contains("[not enabled]"));
}

#[test]
fn test_connect_reads_token_from_stdin() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "x", "--stdin", "--provider-user-id", "tw-1"])
        .write_stdin("piped-token\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected twitter for default"));
}

#[test]
fn test_connect_requires_a_token() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "twitter", "--provider-user-id", "tw-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--token"));
}

#[test]
fn test_connect_disabled_platform_is_invalid_input() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "facebook", "--token", "t", "--provider-user-id", "fb-1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not enabled"));
}

#[test]
fn test_no_verify_stores_disabled_platform() {
    let env = TestEnv::new();

    env.cmd()
        .args([
            "connect",
            "facebook",
            "--token",
            "t",
            "--provider-user-id",
            "fb-1",
            "--page-id",
            "page-1",
            "--no-verify",
        ])
        .assert()
        .success();

    let output = env.cmd().arg("status").output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = status_line(&stdout, "facebook");
    assert!(line.contains("connected") && !line.contains("not connected"));
    assert!(line.contains("[not enabled]"));
}

#[test]
fn test_expired_token_shows_as_expired() {
    let env = TestEnv::new();

    env.cmd()
        .args([
            "connect",
            "tiktok",
            "--token",
            "t",
            "--provider-user-id",
            "tt-1",
            "--expires-at",
            "1000",
        ])
        .assert()
        .success();

    let output = env.cmd().arg("status").output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = status_line(&stdout, "tiktok");
    assert!(line.contains("expired"));
    assert!(line.contains("1970-01-01"));
}

#[test]
fn test_refresh_and_disconnect() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "twitter", "--token", "old", "--provider-user-id", "tw-1"])
        .assert()
        .success();

    env.cmd()
        .args(["refresh", "twitter", "--token", "new", "--expires-at", "4102444800"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Refreshed twitter"));

    env.cmd()
        .args(["disconnect", "twitter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disconnected twitter"));

    env.cmd()
        .args(["disconnect", "twitter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("was not connected"));
}

#[test]
fn test_refresh_without_connection_is_auth_error() {
    let env = TestEnv::new();

    env.cmd()
        .args(["refresh", "tiktok", "--token", "new"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not connected"));
}

#[test]
fn test_unknown_platform_is_rejected() {
    let env = TestEnv::new();

    env.cmd()
        .args(["connect", "myspace", "--token", "t", "--provider-user-id", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown platform"));
}
