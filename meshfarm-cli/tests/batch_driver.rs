//! Integration tests for the batch driver binary.
//!
//! Each test writes a config pointing output and logs into a temporary
//! directory and runs the real `meshfarm` binary against the simulated
//! engine, checking exit codes and the files left behind.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_config(dir: &Path) -> std::path::PathBuf {
    write_config_with_engine(dir, "mode = simulated")
}

fn write_config_with_engine(dir: &Path, engine: &str) -> std::path::PathBuf {
    let path = dir.join("config.ini");
    let content = format!(
        "[engine]\n{engine}\n\n[scheduler]\nconcurrency = 4\n\n[output]\ndirectory = {}\n\n[logging]\nfile = {}\n",
        dir.join("exports").display(),
        dir.join("logs").join("meshfarm.log").display(),
    );
    fs::write(&path, content).unwrap();
    path
}

fn run_cli(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_meshfarm"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run meshfarm binary")
}

#[test]
fn test_build_single_entry_exits_zero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = run_cli(&config, &["build", "dog"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let entry_dir = temp.path().join("exports").join("dog");
    for tier in ["mobile", "tablet", "desktop", "pro"] {
        assert!(entry_dir.join(format!("dog_{tier}.glb")).exists(), "{tier}");
    }
    assert!(entry_dir.join("dog_manifest.json").exists());
    assert!(temp.path().join("logs").join("meshfarm.log").exists());
}

#[test]
fn test_build_all_exits_zero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = run_cli(&config, &["build", "all"]);

    assert!(output.status.success());
    let exports = temp.path().join("exports");
    let manifests = fs::read_dir(&exports)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| {
            let id = e.file_name().to_string_lossy().into_owned();
            e.path().join(format!("{id}_manifest.json")).exists()
        })
        .count();
    assert!(manifests > 1);
}

#[test]
fn test_unknown_entry_exits_one() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = run_cli(&config, &["build", "dodo"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("dodo"));
    assert!(!temp.path().join("exports").join("dodo").exists());
}

#[test]
fn test_failing_builds_exit_one_with_report_and_empty_manifest() {
    let temp = TempDir::new().unwrap();
    let config = write_config_with_engine(
        temp.path(),
        "mode = isolated\ncommand = /nonexistent/meshfarm-engine",
    );

    let output = run_cli(&config, &["build", "dog"]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dog: 0 succeeded, 4 failed"), "stdout: {stdout}");
    assert!(stdout.contains("Total: 0/4 succeeded"), "stdout: {stdout}");

    let entry_dir = temp.path().join("exports").join("dog");
    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(entry_dir.join("dog_manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["tiers"], serde_json::json!({}));
    for tier in ["mobile", "tablet", "desktop", "pro"] {
        assert!(!entry_dir.join(format!("dog_{tier}.glb")).exists(), "{tier}");
    }
}

#[test]
fn test_catalog_lists_entries() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = run_cli(&config, &["catalog"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dog"));
    assert!(stdout.contains("desktop"));
}
