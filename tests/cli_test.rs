//! Integration tests for the stemsplit binary.

#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// Command isolated from the user's config file and storage credentials.
fn stemsplit(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("stemsplit");
    cmd.arg("--config")
        .arg(dir.join("config.toml"))
        .env("STEMSPLIT_MODELS_DIR", dir.join("models"))
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("STEMSPLIT_BUCKET")
        .env_remove("AWS_ENDPOINT_URL")
        .env_remove("AWS_SESSION_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn with_credentials(cmd: &mut assert_cmd::Command) -> &mut assert_cmd::Command {
    cmd.env("AWS_ACCESS_KEY_ID", "AKIDTEST")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("AWS_REGION", "us-east-1")
}

#[test]
fn test_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();

    stemsplit(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();

    stemsplit(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(dir.path().join("config.toml").is_file());

    stemsplit(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    stemsplit(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"))
        .stdout(predicate::str::contains("model = \"htdemucs\""));
}

#[test]
fn test_models_list_reports_presence() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("models")).unwrap();
    std::fs::write(dir.path().join("models/htdemucs.onnx"), b"onnx").unwrap();

    stemsplit(dir.path())
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("htdemucs [default]"))
        .stdout(predicate::str::contains("drums, bass, other, vocals"))
        .stdout(predicate::str::contains("present"))
        .stdout(predicate::str::contains("missing"));
}

#[test]
fn test_models_check_fails_without_default_model_file() {
    let dir = TempDir::new().unwrap();

    stemsplit(dir.path())
        .args(["models", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("default model 'htdemucs'"));
}

#[test]
fn test_run_requires_credentials() {
    let dir = TempDir::new().unwrap();

    stemsplit(dir.path())
        .arg("run")
        .write_stdin("{}")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("AWS_ACCESS_KEY_ID"));
}

#[test]
fn test_run_malformed_payload_prints_error_envelope() {
    let dir = TempDir::new().unwrap();
    let mut cmd = stemsplit(dir.path());

    let output = with_credentials(cmd.arg("run"))
        .write_stdin("not json")
        .assert()
        .failure()
        .code(1);

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(json["error"]["stage"], "validation");
    assert_eq!(json["error"]["kind"], "validation_error");
    assert_eq!(json["error"]["retryable"], false);
}

#[test]
fn test_run_reads_payload_file() {
    let dir = TempDir::new().unwrap();
    let payload = dir.path().join("job.json");
    std::fs::write(&payload, r#"{"input": {"storage_bucket": "b"}}"#).unwrap();
    let mut cmd = stemsplit(dir.path());

    let output = with_credentials(cmd.arg("run").arg("--payload").arg(&payload))
        .assert()
        .failure();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert!(
        json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("audio_url")
    );
}

#[test]
fn test_worker_answers_each_line() {
    let dir = TempDir::new().unwrap();
    let mut cmd = stemsplit(dir.path());

    let output = with_credentials(cmd.arg("worker"))
        .write_stdin("not json\n\n{\"input\": {\"audio_url\": \"ftp://x/a.mp3\", \"storage_bucket\": \"b\"}}\n")
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["error"]["stage"], "validation");
    }
}

#[test]
fn test_worker_survives_non_utf8_line() {
    let dir = TempDir::new().unwrap();
    let mut cmd = stemsplit(dir.path());
    let mut stdin = b"\xff\xfe garbage\n".to_vec();
    stdin.extend_from_slice(
        b"{\"input\": {\"audio_url\": \"ftp://x/a.mp3\", \"storage_bucket\": \"b\"}}\n",
    );

    let output = with_credentials(cmd.arg("worker"))
        .write_stdin(stdin)
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["error"]["kind"], "validation_error");
    assert!(
        lines[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("UTF-8")
    );
    assert!(
        lines[1]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ftp")
    );
}
