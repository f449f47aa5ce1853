//! Shared helpers for integration tests
#![allow(dead_code)]

use runtime_delegates::{DelegateConfig, SourceDescriptor};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const MANIFEST_YAML: &str = r#"
specVersion: v1alpha1
endpoints:
  hello:
    httpsTrigger: {}
  nightly:
    region: [europe-west1]
    scheduleTrigger:
      schedule: every 24 hours
"#;

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
    path
}

pub fn source(dir: &TempDir) -> SourceDescriptor {
    SourceDescriptor::new("demo-project", dir.path(), dir.path())
}

/// Config with short waits so failing tests finish quickly
pub fn fast_config() -> DelegateConfig {
    DelegateConfig::default()
        .with_grace_period(Duration::from_millis(500))
        .with_discovery_timeout(Duration::from_secs(5))
}

pub fn node_project(sdk_range: &str) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_file(
        dir.path(),
        "package.json",
        &format!(
            r#"{{"name": "fns", "main": "index.js", "dependencies": {{"firebase-functions": "{}"}}}}"#,
            sdk_range
        ),
    );
    write_file(
        dir.path(),
        "index.js",
        r#"const functions = require("firebase-functions");
exports.hello = functions.https.onRequest((req, res) => res.send("hi"));
exports.onJob = functions.pubsub.topic("jobs").onPublish(() => null);
"#,
    );
    dir
}

pub fn dart_project() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_file(
        dir.path(),
        "pubspec.yaml",
        "name: fns\ndependencies:\n  firebase_functions: ^0.2.0\ndev_dependencies:\n  build_runner: ^2.4.0\n",
    );
    write_file(
        dir.path(),
        "bin/server.dart",
        "void main(List<String> args) {\n  fireUp(args, (firebase) {\n    firebase.https.onRequest(name: 'hello', (r) async => Response.ok('hi'));\n  });\n}\n",
    );
    dir
}

/// Executable `/bin/sh` script standing in for a toolchain binary
#[cfg(unix)]
pub fn fake_binary(root: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}
