//! CLI integration tests
//!
//! These run the built `rtdelegate` binary and check output and exit codes.

mod support;

use std::path::Path;
use std::process::{Command, Output};
use support::{node_project, write_file};
use tempfile::TempDir;

fn rtdelegate(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rtdelegate"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("RTDELEGATE_LOG_LEVEL")
        .env_remove("RTDELEGATE_LOG_JSON")
        .output()
        .expect("Failed to execute rtdelegate")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_cli_help() {
    let output = rtdelegate(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rtdelegate"));
    assert!(stdout.contains("detect"));
    assert!(stdout.contains("discover"));
    assert!(stdout.contains("validate"));
}

#[test]
fn test_cli_version() {
    let output = rtdelegate(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_detect_node_json() {
    let dir = node_project("^4.0.0");
    let output = rtdelegate(&["detect", &path_arg(dir.path()), "--format", "json"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["language"], "nodejs");
    assert_eq!(report["runtime"], "nodejs22");
    assert_eq!(report["deprecated"], false);
}

#[test]
fn test_detect_deprecated_runtime_is_flagged() {
    let dir = node_project("^4.0.0");
    let output = rtdelegate(&[
        "detect",
        &path_arg(dir.path()),
        "--runtime",
        "nodejs18",
        "--format",
        "json",
    ]);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["runtime"], "nodejs18");
    assert_eq!(report["deprecated"], true);
}

#[test]
fn test_detect_empty_directory_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let output = rtdelegate(&["-q", "detect", &path_arg(dir.path())]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No supported language detected"));
}

#[test]
fn test_validate_missing_sdk_prints_help() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "package.json", r#"{"name": "fns"}"#);
    write_file(dir.path(), "index.js", "");

    let output = rtdelegate(&["-q", "validate", &path_arg(dir.path())]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("firebase-functions"));
    assert!(stderr.contains("Help:"));
}

#[test]
fn test_validate_unsupported_runtime_lists_supported() {
    let dir = node_project("^4.0.0");
    let output = rtdelegate(&[
        "-q",
        "validate",
        &path_arg(dir.path()),
        "--runtime",
        "nodejs10",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nodejs10"));
    assert!(stderr.contains("nodejs22"));
}

#[test]
fn test_discover_static_manifest_as_yaml() {
    let dir = node_project("^4.0.0");
    write_file(dir.path(), "functions.yaml", support::MANIFEST_YAML);

    let output = rtdelegate(&["discover", &path_arg(dir.path()), "--format", "yaml"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let build: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert!(build["endpoints"]["hello"].is_mapping());
    assert!(build["endpoints"]["nightly"].is_mapping());
}

#[test]
fn test_discover_writes_output_file() {
    let dir = node_project("^4.0.0");
    write_file(dir.path(), "functions.yaml", support::MANIFEST_YAML);
    let out = TempDir::new().unwrap();
    let out_file = out.path().join("build.json");

    let output = rtdelegate(&[
        "discover",
        &path_arg(dir.path()),
        "--format",
        "json",
        "--output",
        &path_arg(&out_file),
    ]);

    assert!(output.status.success());
    let build: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_file).unwrap()).unwrap();
    assert_eq!(build["endpoints"]["nightly"]["regions"][0], "europe-west1");
}

#[test]
fn test_discover_rejects_non_object_runtime_config() {
    let dir = node_project("^4.0.0");
    let config = write_file(dir.path(), "runtime-config.json", "[1, 2, 3]");

    let output = rtdelegate(&[
        "-q",
        "discover",
        &path_arg(dir.path()),
        "--runtime-config",
        &path_arg(&config),
    ]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_config_prints_effective_values() {
    let output = rtdelegate(&["config"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Grace Period"));
}

#[test]
fn test_quiet_conflicts_with_verbose() {
    let output = rtdelegate(&["-q", "-v", "config"]);
    assert!(!output.status.success());
}
