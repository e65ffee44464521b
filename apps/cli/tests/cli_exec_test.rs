//! Integration tests for the `rfk` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Writes a settings file whose trainer is `sh -c <script>`.
fn write_settings(temp_dir: &TempDir, script: &str) -> std::path::PathBuf {
    let root = temp_dir.path();
    let settings = format!(
        r#"jobs_root = "{jobs}"
checkpoints_root = "{ckpt}"
staging_dir = "{staging}"

[trainer]
program = "sh"
args = ["-c", "{script}", "trainer"]
"#,
        jobs = root.join("jobs").display(),
        ckpt = root.join("checkpoints").display(),
        staging = root.join("staging").display(),
    );
    let path = root.join("refrakt.toml");
    fs::write(&path, settings).unwrap();
    path
}

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("train.yaml");
    fs::write(&path, contents).unwrap();
    path
}

fn rfk() -> Command {
    let mut cmd = Command::cargo_bin("rfk").unwrap();
    for var in ["REFRAKT_JOBS_ROOT", "REFRAKT_CHECKPOINTS_ROOT", "REFRAKT_TRAINER", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    rfk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("check-model"));
}

#[test]
fn test_exec_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    rfk()
        .current_dir(temp_dir.path())
        .arg("exec")
        .arg("does-not-exist.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read configuration"));
}

#[test]
fn test_exec_rejects_non_mapping_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path(), "- just\n- a list\n");
    rfk()
        .current_dir(temp_dir.path())
        .arg("exec")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("top level must be a mapping, found a sequence"))
        .stderr(predicate::str::contains("Invalid YAML generated").not());
}

#[test]
fn test_bad_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("broken.toml");
    fs::write(&settings, "chunk_size = 0\n").unwrap();
    let config = write_config(temp_dir.path(), "model:\n  name: resnet18\n");
    rfk()
        .current_dir(temp_dir.path())
        .arg("--config")
        .arg(&settings)
        .arg("exec")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk_size"));
}

#[cfg(unix)]
#[test]
fn test_exec_completed_job() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(&temp_dir, "echo 'epoch 1/1'; echo 'Experiment ID: 20251105_174807'");
    let config = write_config(temp_dir.path(), "model:\n  name: resnet18\n");

    rfk()
        .current_dir(temp_dir.path())
        .arg("--config")
        .arg(&settings)
        .arg("exec")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("epoch 1/1"))
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("\"result_path\""));

    let jobs: Vec<_> = fs::read_dir(temp_dir.path().join("jobs")).unwrap().collect();
    assert_eq!(jobs.len(), 1);
    assert_eq!(fs::read_dir(temp_dir.path().join("staging")).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_exec_failed_job_exits_nonzero() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(&temp_dir, "echo 'CUDA out of memory'; exit 2");
    let config = write_config(temp_dir.path(), "model:\n  name: resnet18\n");

    rfk()
        .current_dir(temp_dir.path())
        .arg("--config")
        .arg(&settings)
        .arg("exec")
        .arg("--quiet")
        .arg(&config)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"error\""))
        .stdout(predicate::str::contains("\"error\": \"CUDA out of memory\""));
}

#[cfg(unix)]
#[test]
fn test_exec_missing_trainer() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path(), "model:\n  name: resnet18\n");

    rfk()
        .current_dir(temp_dir.path())
        .env("REFRAKT_TRAINER", "/nonexistent/refrakt")
        .env("REFRAKT_JOBS_ROOT", temp_dir.path().join("jobs"))
        .arg("exec")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to launch trainer: /nonexistent/refrakt"))
        .stdout(predicate::str::contains("\"status\": \"error\""));
}
