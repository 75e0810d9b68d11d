// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn curaflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("curaflow").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("NO_COLOR", "1")
        .env_remove("CURAFLOW_SEARCH_ENDPOINT")
        .env_remove("CURAFLOW_LAUNCHER")
        .env_remove("CURAFLOW_RUNS_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    curaflow(dir.path()).arg("init").assert().success();
    dir
}

#[test]
fn init_writes_pipeline_and_settings() {
    let dir = TempDir::new().unwrap();

    curaflow(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created curaflow.yaml"));

    let pipeline = std::fs::read_to_string(dir.path().join("curaflow.yaml")).unwrap();
    assert!(pipeline.contains("subsample-first"));
    assert!(pipeline.contains("S3OutputDQDL"));
    assert!(dir.path().join("curaflow.toml").exists());

    // A second init refuses to clobber the pipeline
    curaflow(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn validate_builtin_pipeline() {
    let dir = initialized();

    curaflow(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is valid!"));
}

#[test]
fn validate_without_pipeline_fails() {
    let dir = TempDir::new().unwrap();

    curaflow(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline file not found"));
}

#[test]
fn graph_as_mermaid() {
    let dir = initialized();

    curaflow(dir.path())
        .args(["graph", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph TD"))
        .stdout(predicate::str::contains("subsample_first --> inspect"));
}

#[test]
fn plan_reports_missing_input() {
    let dir = initialized();

    curaflow(dir.path())
        .args(["plan", "curation", "--set", "S3Input=s3://b/t.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires context key"));
}

#[test]
fn plan_as_json() {
    let dir = initialized();

    let output = curaflow(dir.path())
        .args([
            "plan",
            "curation",
            "--set",
            "S3Input=s3://b/t.csv",
            "--set",
            "S3InputDQDL=s3://b/rules",
            "--set",
            "TableName=orders",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["workflow"], "curation");
    assert_eq!(plan["stages"].as_array().unwrap().len(), 5);
    assert_eq!(plan["stages"][4]["name"], "curate");
    assert_eq!(plan["resources"][0], "search-index");
}

#[test]
fn simulated_run_is_recorded() {
    let dir = initialized();

    curaflow(dir.path())
        .args([
            "run",
            "curation",
            "--simulate",
            "--set",
            "S3Input=s3://b/t.csv",
            "--set",
            "S3InputDQDL=s3://b/rules",
            "--set",
            "TableName=orders",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run succeeded!"))
        .stdout(predicate::str::contains("S3OutputDQDL = sim://curaflow/curate/s3_output_dqdl"));

    curaflow(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("curation"))
        .stdout(predicate::str::contains("succeeded"));
}

#[test]
fn run_needing_index_without_endpoint_fails() {
    let dir = initialized();
    std::fs::remove_file(dir.path().join("curaflow.toml")).unwrap();

    curaflow(dir.path())
        .args([
            "run",
            "--launcher",
            "simulated",
            "--set",
            "S3Input=s3://b/t.csv",
            "--set",
            "S3InputDQDL=s3://b/rules",
            "--set",
            "TableName=orders",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No search endpoint configured"));
}

#[test]
fn status_of_unknown_run() {
    let dir = initialized();

    curaflow(dir.path())
        .args(["status", "00000000-0000-4000-8000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn policy_table() {
    let dir = initialized();

    curaflow(dir.path())
        .arg("policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("stage:curate"))
        .stdout(predicate::str::contains("bootstrap"));
}
