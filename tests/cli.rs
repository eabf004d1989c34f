//! CLI smoke tests.
//!
//! Every invocation pins SHIPKIT_* environment overrides (empty values
//! force-unset any broker config on the host) so the tests always run
//! against the local simulator.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::tempdir;

fn shipkit(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("shipkit").unwrap();
    cmd.current_dir(workdir)
        .env("SHIPKIT_BROKER_URL", "")
        .env("SHIPKIT_DEVICE_TOKEN", "")
        .env("SHIPKIT_OUTPUT_DIR", workdir.join("out"));
    cmd
}

fn make_project(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("node_modules/dep")).unwrap();
    fs::write(root.join("index.html"), "<html></html>").unwrap();
    fs::write(root.join("src/app.js"), "console.log('hi')").unwrap();
    fs::write(root.join("src/style.css"), "body {}").unwrap();
    fs::write(root.join("node_modules/dep/index.js"), "x").unwrap();
}

#[test]
fn help_describes_the_tool() {
    let dir = tempdir().unwrap();
    shipkit(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Publish locally built apps to a hosting broker",
        ))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("diagnostics"));
}

#[test]
fn publish_starts_a_simulated_job() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("my-app");
    make_project(&project);

    shipkit(dir.path())
        .args(["--quiet", "publish", "--owner", "1", "--dir"])
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("started"))
        .stdout(predicate::str::contains("simulated"))
        .stdout(predicate::str::contains("shipkit status"));
}

#[test]
fn status_of_unknown_job_reports_failed_without_crashing() {
    let dir = tempdir().unwrap();
    shipkit(dir.path())
        .args(["--quiet", "status", "no-such-job"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn cancel_of_unknown_job_is_not_successful() {
    let dir = tempdir().unwrap();
    shipkit(dir.path())
        .args(["--quiet", "cancel", "no-such-job"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not cancelled"));
}

#[test]
fn diagnostics_emit_redacted_json() {
    let dir = tempdir().unwrap();
    shipkit(dir.path())
        .args(["--quiet", "diagnostics", "--owner", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"transport\": \"stub\""))
        .stdout(predicate::str::contains("\"registered_jobs\": []"));
}

#[test]
fn partial_broker_config_fails_with_hint() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("shipkit").unwrap();
    cmd.current_dir(dir.path())
        .env("SHIPKIT_BROKER_URL", "https://broker.example")
        .env("SHIPKIT_DEVICE_TOKEN", "")
        .args(["--quiet", "diagnostics", "--owner", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E302"))
        .stderr(predicate::str::contains("device_token"));
}
