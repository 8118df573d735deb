use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn keel() -> Command {
    let mut cmd = Command::cargo_bin("keel").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

const STACK: &str = r#"
services:
  - name: app
    primary_probe:
      kind: http_body_contains
      target: http://localhost:8080/actuator/health
      success_pattern: { substring: UP }
    fallback_probe:
      kind: http_body_contains
      target: http://localhost:8080/
      success_pattern: { regex: "(?i)<html" }
    max_attempts: 30
    retry_interval: 10s
  - name: db
    primary_probe: { kind: tcp_connect, target: "localhost:3306" }
startup_order: [db, app]
"#;

#[test]
fn test_help() {
    keel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_validate_accepts_plan() {
    let dir = TempDir::new().unwrap();
    let plan = write(&dir, "plan.yaml", STACK);

    keel()
        .args(["--no-color", "validate", "--plan", arg(&plan)])
        .assert()
        .success()
        .stdout(predicate::str::contains("db -> app"))
        .stdout(predicate::str::contains("tcp localhost:3306"));
}

#[test]
fn test_validate_json_output() {
    let dir = TempDir::new().unwrap();
    let plan = write(&dir, "plan.yaml", STACK);

    let output = keel()
        .args(["-o", "json", "validate", "--plan", arg(&plan)])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["name"], "db");
    assert_eq!(rows[1]["name"], "app");
    assert_eq!(rows[1]["attempts"], 30);
}

#[test]
fn test_verify_yaml_output_keeps_pattern_format() {
    let dir = TempDir::new().unwrap();
    let plan = write(
        &dir,
        "plan.yaml",
        r#"
services:
  - name: app
    primary_probe:
      kind: http_body_contains
      target: http://127.0.0.1:9/health
      success_pattern: { substring: UP }
    max_attempts: 1
    connect_timeout: 200ms
    request_timeout: 500ms
"#,
    );

    keel()
        .args(["-o", "yaml", "verify", "--plan", arg(&plan)])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("substring: UP"))
        .stdout(predicate::str::contains("outcome: reported"));
}

#[test]
fn test_validate_rejects_duplicate_services() {
    let dir = TempDir::new().unwrap();
    let plan = write(
        &dir,
        "plan.yaml",
        r#"
services:
  - name: db
    primary_probe: { kind: tcp_connect, target: "localhost:3306" }
  - name: db
    primary_probe: { kind: tcp_connect, target: "localhost:3307" }
"#,
    );

    keel()
        .args(["validate", "--plan", arg(&plan)])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("duplicate"));
}

#[test]
fn test_missing_plan_is_usage_error() {
    let dir = TempDir::new().unwrap();

    keel()
        .args(["validate", "--plan", arg(&dir.path().join("absent.yaml"))])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.yaml"));
}

#[test]
fn test_config_shows_defaults() {
    keel()
        .args(["-o", "json", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"program\": \"docker\""));
}

#[test]
fn test_deploy_aborts_without_compose_file() {
    let dir = TempDir::new().unwrap();
    let plan = write(&dir, "plan.yaml", STACK);
    let config = write(
        &dir,
        "keel.toml",
        &format!(
            "[compose]\nproject_dir = {:?}\nprogram = \"keel-no-such-runtime\"\n",
            dir.path().display().to_string()
        ),
    );

    keel()
        .args([
            "--no-color",
            "--config",
            arg(&config),
            "deploy",
            "--plan",
            arg(&plan),
        ])
        .assert()
        .code(4)
        .stdout(predicate::str::contains("ABORTED during PREPARING"))
        .stdout(predicate::str::contains("docker-compose.yml"));
}

#[test]
fn test_verify_reports_success_for_listening_service() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = TempDir::new().unwrap();
    let plan = write(
        &dir,
        "plan.yaml",
        &format!(
            r#"
services:
  - name: db
    primary_probe: {{ kind: tcp_connect, target: "127.0.0.1:{port}" }}
    max_attempts: 1
"#
        ),
    );

    keel()
        .args(["--no-color", "verify", "--plan", arg(&plan)])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("HEALTHY"))
        .stdout(predicate::str::contains("Overall: SUCCESS"));
}

#[test]
fn test_verify_reports_failure_for_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let dir = TempDir::new().unwrap();
    let plan = write(
        &dir,
        "plan.yaml",
        &format!(
            r#"
services:
  - name: db
    primary_probe: {{ kind: tcp_connect, target: "127.0.0.1:{port}" }}
    max_attempts: 2
    retry_interval: 50ms
"#
        ),
    );

    let output = keel()
        .args(["-o", "json", "verify", "--plan", arg(&plan)])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["outcome"], "reported");
    assert_eq!(outcome["overall"], "FAILURE");
    assert_eq!(outcome["records"]["db"]["final_state"], "FAILED");
    assert_eq!(outcome["records"]["db"]["error"], "CONN_REFUSED");
    assert_eq!(outcome["records"]["db"]["attempts_used"], 2);
}
