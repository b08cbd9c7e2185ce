//! Integration tests for the fservice CLI
//!
//! These tests run the actual binary against request files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn fservice_cmd() -> Command {
    let mut cmd = Command::cargo_bin("fservice").unwrap();
    cmd.env_remove("FSERVICE_LOCALE");
    cmd
}

fn request(dir: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_help_flag() {
    fservice_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declarative service resolution engine"));
}

#[test]
fn test_list_shows_catalog() {
    fservice_cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("note_list"))
        .stdout(predicate::str::contains("note_digest"))
        .stdout(predicate::str::contains("skip_feature"));
}

#[test]
fn test_inspect_shows_flattened_declarations() {
    fservice_cmd()
        .args(["inspect", "note_list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skip_feature, order_by_feature"))
        .stdout(predicate::str::contains("in_array:{{available_order_by}}.*"))
        .stdout(predicate::str::contains("result.notify:after_commit"));
}

#[test]
fn test_inspect_unknown_service_fails() {
    fservice_cmd()
        .args(["inspect", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SVC-010"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_run_note_list() {
    let dir = TempDir::new().unwrap();
    let file = request(
        &dir,
        "list.yaml",
        r#"
service: note_list
inputs:
  token: secret-token
  words: rust
  order_by: title asc
"#,
    );

    fservice_cmd()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"result\""))
        .stdout(predicate::str::contains("Meeting notes"))
        .stdout(predicate::str::contains("Rust ownership"));
}

#[test]
fn test_run_validation_errors_exit_2() {
    let dir = TempDir::new().unwrap();
    let file = request(&dir, "missing.yaml", "service: note_list\n");

    fservice_cmd()
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"errors\""))
        .stdout(predicate::str::contains("The api token field is required."));
}

#[test]
fn test_locale_flag_overrides_request() {
    let dir = TempDir::new().unwrap();
    let file = request(&dir, "ko.yaml", "service: note_list\nlocale: en\n");

    fservice_cmd()
        .args(["run", "--locale", "ko"])
        .arg(&file)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("api token 항목은 필수입니다."));
}

#[test]
fn test_locale_from_environment() {
    let dir = TempDir::new().unwrap();
    let file = request(&dir, "env.yaml", "service: note_list\n");

    fservice_cmd()
        .env("FSERVICE_LOCALE", "ko")
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("항목은 필수입니다."));
}

#[test]
fn test_commit_runs_after_commit_callbacks() {
    let dir = TempDir::new().unwrap();
    let file = request(
        &dir,
        "digest.yaml",
        r#"
service: note_digest
inputs:
  token: secret-token
  queries: [rust, trip]
"#,
    );

    fservice_cmd()
        .args(["run", "--commit"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"notifications\""))
        .stdout(predicate::str::contains("listed 2 notes for 'rust'"))
        .stdout(predicate::str::contains("digest of 2 queries ready"));
}

#[test]
fn test_commit_from_request_file() {
    let dir = TempDir::new().unwrap();
    let file = request(
        &dir,
        "commit.yaml",
        "service: note_list\ncommit: true\ninputs:\n  token: secret-token\n",
    );

    fservice_cmd()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("listed 3 notes for '*'"));
}

#[test]
fn test_events_flag_includes_log() {
    let dir = TempDir::new().unwrap();
    let file = request(
        &dir,
        "events.yaml",
        "service: note_client\ninputs:\n  token: secret-token\n",
    );

    fservice_cmd()
        .args(["run", "--events"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"events\""))
        .stdout(predicate::str::contains("service_started"))
        .stdout(predicate::str::contains("rules_evaluated"));
}

#[test]
fn test_missing_file_fails() {
    fservice_cmd()
        .args(["run", "/nonexistent/request.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_unknown_request_field_fails() {
    let dir = TempDir::new().unwrap();
    let file = request(&dir, "bad.yaml", "service: note_list\nparent: root\n");

    fservice_cmd()
        .arg("run")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("YAML parse error"));
}

#[test]
fn test_service_without_result_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let file = request(&dir, "trait.yaml", "service: skip_feature\n");

    fservice_cmd()
        .arg("run")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SVC-033"));
}
