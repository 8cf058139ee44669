//! Integration tests for the `htpi` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, config
//! commands and the login gate, all without a live gateway. REST calls go
//! to a wiremock server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `htpi` binary with env isolation.
///
/// Points HOME and XDG dirs at `home`, clears `HTPI_*` overrides and keeps
/// credentials in memory so tests never touch a real keyring.
fn htpi_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("htpi");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("HTPI_DEFAULTS__CREDENTIAL_STORE", "memory")
        .env_remove("HTPI_PROFILE")
        .env_remove("HTPI_GATEWAY_URL")
        .env_remove("HTPI_OUTPUT")
        .env_remove("HTPI_INSECURE")
        .env_remove("HTPI_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = htpi_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("HTPI customer portal")
            .and(predicate::str::contains("login"))
            .and(predicate::str::contains("patients"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("htpi"));
}

#[test]
fn test_invalid_output_format_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .args(["--output", "xml", "whoami"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_points_at_toml() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_use_unknown_profile_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = htpi_cmd(home.path())
        .args(["config", "use", "staging"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("staging"));
}

#[test]
fn test_unknown_profile_flag_fails_before_connecting() {
    let home = tempfile::tempdir().unwrap();
    let output = htpi_cmd(home.path())
        .args(["--profile", "prod", "patients", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Profile 'prod' not found"));
}

// ── Login gate ──────────────────────────────────────────────────────

#[test]
fn test_records_require_login() {
    let home = tempfile::tempdir().unwrap();
    let output = htpi_cmd(home.path())
        .args(["patients", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3), "Expected auth exit code");
    let text = combined_output(&output);
    assert!(text.contains("Not logged in"), "{text}");
    assert!(text.contains("htpi login"), "{text}");
}

#[test]
fn test_whoami_requires_login() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path()).arg("whoami").assert().code(3);
}

#[test]
fn test_request_rejects_malformed_operation() {
    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .args(["request", "patients"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("<resource>:<action>"));
}

// ── REST flows against a mock gateway ───────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_login_with_bad_password_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Invalid email or password"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let output = htpi_cmd(home.path())
        .args(["--gateway", &server.uri(), "login", "--email", "ada@example.com"])
        .arg("--password-stdin")
        .write_stdin("wrong\n")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("Invalid email or password"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forgot_password_posts_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/forgot-password"))
        .and(body_json(json!({ "email": "ada@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    htpi_cmd(home.path())
        .args(["--gateway", &server.uri(), "password", "forgot", "ada@example.com"])
        .assert()
        .success()
        .stderr(predicate::str::contains("reset link"));
}
