//! Python delegate
//!
//! Owns any source directory with a `requirements.txt`. Discovery runs the
//! SDK's serving module in the project's interpreter and probes it over HTTP.

use super::{
    file_exists, introspection_env, resolve_runtime, RuntimeDelegate, RuntimeResolution,
    SdkVersionCache, SourceDescriptor,
};
use crate::config::DelegateConfig;
use crate::discovery::http::{introspection_url, QUIT_PATH};
use crate::discovery::{
    self, legacy, DiscoveryOptions, DiscoveryTarget, EnvBindings, ProbeKind, RuntimeConfigValues,
};
use crate::error::{DelegateError, Result};
use crate::output::BuildDescription;
use crate::runtime::{LanguageId, RuntimeId};
use crate::supervisor::{ProcessSpec, ShutdownProtocol, SupervisedProcess, Teardown};
use async_trait::async_trait;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const REQUIREMENTS_TXT: &str = "requirements.txt";
pub const SDK_PACKAGE: &str = "firebase-functions";
pub const STATIC_MANIFEST: &str = "functions.yaml";
pub const ENTRY_FILE: &str = "main.py";
const SERVING_MODULE: &str = "firebase_functions.private.serving";

const MIN_DISCOVERY_SDK: Version = Version::new(0, 1, 0);

pub struct PythonDelegate {
    source: SourceDescriptor,
    runtime: RuntimeId,
    config: DelegateConfig,
    sdk_version: SdkVersionCache,
}

impl PythonDelegate {
    pub fn try_create(source: &SourceDescriptor, config: &DelegateConfig) -> Result<Option<Self>> {
        if !source.path(REQUIREMENTS_TXT).exists() {
            debug!(source = %source.source_dir.display(), "no requirements.txt; not Python");
            return Ok(None);
        }

        let runtime = match resolve_runtime(source, LanguageId::Python, None)? {
            RuntimeResolution::Resolved(runtime) => runtime,
            RuntimeResolution::OtherEcosystem => return Ok(None),
        };

        Ok(Some(Self {
            source: source.clone(),
            runtime,
            config: config.clone(),
            sdk_version: SdkVersionCache::new(),
        }))
    }

    /// Installed SDK version from the venv, else the pin in requirements.txt
    pub async fn sdk_version(&self) -> Option<String> {
        self.sdk_version
            .get_or_resolve(|| async {
                match installed_sdk_version(&self.source.path("venv")).await {
                    Some(version) => Some(version),
                    None => pinned_sdk_version(&self.source.path(REQUIREMENTS_TXT)).await,
                }
            })
            .await
    }

    /// The venv interpreter when one exists, so the SDK resolves from it
    async fn interpreter(&self) -> PathBuf {
        let venv_python = if cfg!(windows) {
            self.source.path("venv").join("Scripts").join("python.exe")
        } else {
            self.source.path("venv").join("bin").join("python")
        };
        if file_exists(&venv_python).await {
            venv_python
        } else {
            self.config.python_bin.clone()
        }
    }
}

#[async_trait]
impl RuntimeDelegate for PythonDelegate {
    fn language(&self) -> LanguageId {
        LanguageId::Python
    }

    fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    async fn validate(&self) -> Result<()> {
        let path = self.source.path(REQUIREMENTS_TXT);
        let requirements = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DelegateError::validation(
                format!("Could not read {}: {}", path.display(), e),
                "Make sure requirements.txt exists and is readable.",
            )
        })?;

        let listed = requirements
            .lines()
            .filter_map(parse_requirement)
            .any(|(name, _)| name == SDK_PACKAGE);
        if !listed {
            return Err(DelegateError::validation(
                format!("{} is not listed in requirements.txt", SDK_PACKAGE),
                format!("Add `{}` to requirements.txt and reinstall the venv.", SDK_PACKAGE),
            ));
        }

        let entry = self.source.path(ENTRY_FILE);
        if !file_exists(&entry).await {
            return Err(DelegateError::validation(
                format!("Entry file {} does not exist", entry.display()),
                "Python functions are loaded from main.py in the functions directory.",
            ));
        }
        Ok(())
    }

    async fn build(&self) -> Result<()> {
        Ok(())
    }

    async fn watch(&self) -> Result<Teardown> {
        Ok(Teardown::noop())
    }

    async fn serve(
        &self,
        port: u16,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<Teardown> {
        let spec = ProcessSpec::new("python-functions", self.interpreter().await)
            .args(["-m", SERVING_MODULE])
            .working_dir(&self.source.source_dir)
            .env(introspection_env(
                &self.source.project_id,
                "ADMIN_PORT",
                port,
                config,
                env,
            ))
            .shutdown(ShutdownProtocol::QuitRequest {
                url: introspection_url(port, QUIT_PATH),
            })
            .grace_period(self.config.grace_period);

        Ok(Teardown::single(SupervisedProcess::spawn(spec)?))
    }

    async fn discover_build(
        &self,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<BuildDescription> {
        discovery::discover_build(self, config, env, &DiscoveryOptions::from(&self.config)).await
    }
}

#[async_trait]
impl DiscoveryTarget for PythonDelegate {
    fn display_name(&self) -> String {
        format!("{} ({})", LanguageId::Python.name(), self.runtime)
    }

    fn static_manifest_path(&self) -> PathBuf {
        self.source.path(STATIC_MANIFEST)
    }

    fn probe_kind(&self) -> ProbeKind {
        ProbeKind::Http
    }

    fn minimum_sdk_version(&self) -> Version {
        MIN_DISCOVERY_SDK
    }

    async fn sdk_version(&self) -> Option<String> {
        PythonDelegate::sdk_version(self).await
    }

    async fn start_discovery_process(
        &self,
        port: u16,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<Teardown> {
        self.serve(port, config, env).await
    }

    async fn legacy_scan(&self) -> Result<BuildDescription> {
        legacy::scan_python(&self.source.path(ENTRY_FILE)).await
    }
}

/// PEP 503 name normalization: case-insensitive, `_` and `.` equal `-`
fn normalize_package_name(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

/// Splits one requirements line into a normalized name and the version
/// after `==`, `>=` or `~=`. Options, comments and blanks yield `None`.
fn parse_requirement(line: &str) -> Option<(String, Option<String>)> {
    let line = line.split('#').next()?.trim();
    if line.is_empty() || line.starts_with('-') {
        return None;
    }

    let name_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    let name = normalize_package_name(&line[..name_end]);

    let mut rest = line[name_end..].trim_start();
    if rest.starts_with('[') {
        rest = rest.find(']').map_or("", |end| rest[end + 1..].trim_start());
    }

    let version = ["==", ">=", "~="]
        .iter()
        .find_map(|op| rest.strip_prefix(op))
        .and_then(|v| {
            v.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .find(|part| !part.is_empty())
        })
        .map(str::to_string);

    Some((name, version))
}

async fn pinned_sdk_version(requirements: &Path) -> Option<String> {
    let text = tokio::fs::read_to_string(requirements).await.ok()?;
    text.lines()
        .filter_map(parse_requirement)
        .find(|(name, _)| name == SDK_PACKAGE)
        .and_then(|(_, version)| version)
}

/// Looks for `firebase_functions-<version>.dist-info` in the venv's
/// site-packages.
async fn installed_sdk_version(venv: &Path) -> Option<String> {
    let prefix = "firebase_functions-";
    let suffix = ".dist-info";
    let mut lib = tokio::fs::read_dir(venv.join("lib")).await.ok()?;

    while let Ok(Some(python_dir)) = lib.next_entry().await {
        let Ok(mut packages) = tokio::fs::read_dir(python_dir.path().join("site-packages")).await
        else {
            continue;
        };
        while let Ok(Some(entry)) = packages.next_entry().await {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(version) = name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
            {
                return Some(version.to_string());
            }
        }
    }
    None
}
