//! Node.js delegate
//!
//! Owns any source directory with a `package.json`. The SDK ships its own
//! dev server binary, so discovery is a plain HTTP probe.

use super::{
    file_exists, introspection_env, resolve_runtime, RuntimeDelegate, RuntimeResolution,
    SdkVersionCache, SourceDescriptor,
};
use crate::config::DelegateConfig;
use crate::discovery::http::{introspection_url, QUIT_PATH};
use crate::discovery::version::strip_range_operator;
use crate::discovery::{
    self, legacy, DiscoveryOptions, DiscoveryTarget, EnvBindings, ProbeKind, RuntimeConfigValues,
};
use crate::error::{DelegateError, Result};
use crate::output::BuildDescription;
use crate::runtime::{LanguageId, RuntimeId};
use crate::supervisor::{ProcessSpec, ShutdownProtocol, SupervisedProcess, Teardown};
use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PACKAGE_JSON: &str = "package.json";
pub const SDK_PACKAGE: &str = "firebase-functions";
pub const STATIC_MANIFEST: &str = "functions.yaml";
const DEFAULT_ENTRY: &str = "index.js";

/// Oldest SDK that answers the introspection endpoint
const MIN_DISCOVERY_SDK: Version = Version::new(3, 20, 0);
/// Oldest SDK that can be deployed at all
const MIN_SUPPORTED_SDK: Version = Version::new(2, 0, 0);

pub struct NodeDelegate {
    source: SourceDescriptor,
    runtime: RuntimeId,
    config: DelegateConfig,
    sdk_version: SdkVersionCache,
}

impl NodeDelegate {
    /// Claims the source when `package.json` exists.
    ///
    /// The runtime comes from the declared runtime, then `engines.node`,
    /// then the newest supported Node.js.
    pub fn try_create(source: &SourceDescriptor, config: &DelegateConfig) -> Result<Option<Self>> {
        let package_json = source.path(PACKAGE_JSON);
        if !package_json.exists() {
            debug!(source = %source.source_dir.display(), "no package.json; not Node.js");
            return Ok(None);
        }

        // a declared runtime wins, so engines.node is only read without one
        let engines = match source.declared_runtime {
            Some(_) => None,
            None => engines_runtime(&package_json)?,
        };
        let runtime = match resolve_runtime(source, LanguageId::Node, engines)? {
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

    /// SDK version, read at most once per delegate
    pub async fn sdk_version(&self) -> Option<String> {
        self.sdk_version
            .get_or_resolve(|| resolve_sdk_version(&self.source.source_dir))
            .await
    }

    /// How many times the SDK version was read from disk
    pub fn sdk_version_reads(&self) -> usize {
        self.sdk_version.resolutions()
    }

    async fn package_json(&self) -> Result<Value> {
        let path = self.source.path(PACKAGE_JSON);
        load_json(&path).await?.ok_or_else(|| {
            DelegateError::validation(
                format!("{} is missing or is not valid JSON", path.display()),
                "Fix the syntax errors in package.json.",
            )
        })
    }

    async fn entry_file(&self) -> PathBuf {
        let main = self
            .package_json()
            .await
            .ok()
            .and_then(|pkg| pkg.get("main").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ENTRY.to_string());
        self.source.path(main)
    }

    fn sdk_bin(&self) -> PathBuf {
        self.source
            .path("node_modules")
            .join(".bin")
            .join(SDK_PACKAGE)
    }
}

#[async_trait]
impl RuntimeDelegate for NodeDelegate {
    fn language(&self) -> LanguageId {
        LanguageId::Node
    }

    fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    async fn validate(&self) -> Result<()> {
        let pkg = self.package_json().await?;

        let declared = pkg
            .get("dependencies")
            .and_then(|deps| deps.get(SDK_PACKAGE))
            .is_some();
        if !declared {
            return Err(DelegateError::validation(
                format!("{} is not listed in package.json dependencies", SDK_PACKAGE),
                format!("Run `npm install --save {}` in the functions directory.", SDK_PACKAGE),
            ));
        }

        let entry = self.entry_file().await;
        if !file_exists(&entry).await {
            return Err(DelegateError::validation(
                format!("Entry file {} does not exist", entry.display()),
                "Set \"main\" in package.json to your compiled entry point, or create index.js.",
            ));
        }

        if let Some(raw) = self.sdk_version().await {
            if let Ok(found) = Version::parse(&raw) {
                if found < MIN_SUPPORTED_SDK {
                    return Err(DelegateError::validation(
                        format!(
                            "{} {} is no longer supported; {} or later is required",
                            SDK_PACKAGE, found, MIN_SUPPORTED_SDK
                        ),
                        format!("Run `npm install --save {}@latest`.", SDK_PACKAGE),
                    ));
                }
            }
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
        let spec = ProcessSpec::new("node-functions", &self.config.node_bin)
            .args([
                self.sdk_bin().display().to_string(),
                self.source.source_dir.display().to_string(),
            ])
            .working_dir(&self.source.source_dir)
            .env(introspection_env(
                &self.source.project_id,
                "PORT",
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
impl DiscoveryTarget for NodeDelegate {
    fn display_name(&self) -> String {
        format!("{} ({})", LanguageId::Node.name(), self.runtime)
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
        NodeDelegate::sdk_version(self).await
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
        legacy::scan_node(&self.entry_file().await).await
    }
}

/// `Ok(None)` when the file is missing or not valid JSON; detection and
/// version lookup must not fail on content.
fn parse_json(path: &Path, read: std::io::Result<String>) -> Result<Option<Value>> {
    match read {
        Ok(text) => Ok(serde_json::from_str(&text).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DelegateError::io(path, e)),
    }
}

/// Blocking read for `try_create`, which runs outside the runtime
fn read_json(path: &Path) -> Result<Option<Value>> {
    parse_json(path, std::fs::read_to_string(path))
}

async fn load_json(path: &Path) -> Result<Option<Value>> {
    parse_json(path, tokio::fs::read_to_string(path).await)
}

async fn resolve_sdk_version(source_dir: &Path) -> Option<String> {
    let installed = source_dir
        .join("node_modules")
        .join(SDK_PACKAGE)
        .join(PACKAGE_JSON);
    if let Some(version) = load_json(&installed)
        .await
        .ok()
        .flatten()
        .and_then(|pkg| pkg.get("version")?.as_str().map(str::to_string))
    {
        return Some(version);
    }

    let pkg = load_json(&source_dir.join(PACKAGE_JSON)).await.ok().flatten()?;
    let declared = pkg.get("dependencies")?.get(SDK_PACKAGE)?.as_str()?;
    Some(strip_range_operator(declared).to_string())
}

/// Maps `engines.node` (e.g. `"20"` or `">=18"`) onto the registry.
fn engines_runtime(package_json: &Path) -> Result<Option<RuntimeId>> {
    let Some(pkg) = read_json(package_json)? else {
        return Ok(None);
    };
    let Some(engine) = pkg
        .get("engines")
        .and_then(|engines| engines.get("node"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let major: String = strip_range_operator(engine.trim())
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if major.is_empty() {
        return Ok(None);
    }
    RuntimeId::parse_supported(&format!("nodejs{}", major)).map(Some)
}
