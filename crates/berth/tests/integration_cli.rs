//! CLI behavior that does not need a container runtime
//!
//! Every failure here happens while parsing flags or resolving configuration,
//! before any connection to docker or podman is attempted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn berth() -> Command {
    let mut cmd = Command::cargo_bin("berth").unwrap();
    cmd.env_remove("BERTH_LOG")
        .env_remove("BERTH_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace_with_config(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".devcontainer")).unwrap();
    fs::write(
        dir.path().join(".devcontainer").join("devcontainer.json"),
        config,
    )
    .unwrap();
    dir
}

#[test]
fn test_help_lists_commands() {
    berth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("run-user-commands"))
        .stdout(predicate::str::contains("down"));
}

#[test]
fn test_version_flag() {
    berth()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("berth"));
}

#[test]
fn test_exec_without_command_is_usage_error() {
    berth().arg("exec").assert().failure().code(2);
}

#[test]
fn test_up_without_config_or_image_fails() {
    let dir = TempDir::new().unwrap();
    berth()
        .arg("--workspace-folder")
        .arg(dir.path())
        .arg("up")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_missing_workspace_folder_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");
    berth()
        .arg("--workspace-folder")
        .arg(&missing)
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist"));
}

#[test]
fn test_build_only_config_is_not_implemented() {
    let dir = workspace_with_config(r#"{ "build": { "dockerfile": "Dockerfile" } }"#);
    berth()
        .arg("--workspace-folder")
        .arg(dir.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not implemented"));
}

#[test]
fn test_post_attach_wait_for_is_rejected() {
    let dir = workspace_with_config(
        r#"{
            // comments are allowed
            "image": "alpine:3.19",
            "waitFor": "postAttachCommand",
        }"#,
    );
    berth()
        .arg("--workspace-folder")
        .arg(dir.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("waitFor"));
}

#[test]
fn test_malformed_env_flag_fails() {
    let dir = workspace_with_config(r#"{ "image": "alpine:3.19" }"#);
    berth()
        .arg("--workspace-folder")
        .arg(dir.path())
        .args(["--env", "NOEQUALS", "up"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_unknown_runtime_is_usage_error() {
    berth()
        .args(["--runtime", "containerd", "up"])
        .assert()
        .failure()
        .code(2);
}
