//! Dart delegate
//!
//! Dart has no dev server that can describe itself. Instead the SDK's
//! `build_runner` generator writes the trigger manifest under
//! `.dart_tool/`, so live discovery means "run the generator, then read
//! the static file again".

use super::{
    file_exists, introspection_env, resolve_runtime, RuntimeDelegate, RuntimeResolution,
    SdkVersionCache, SourceDescriptor,
};
use crate::config::DelegateConfig;
use crate::discovery::version::strip_range_operator;
use crate::discovery::{
    self, legacy, DiscoveryOptions, DiscoveryTarget, EnvBindings, ProbeKind, RuntimeConfigValues,
};
use crate::error::{DelegateError, Result};
use crate::output::BuildDescription;
use crate::runtime::{LanguageId, RuntimeId};
use crate::supervisor::{with_teardown, ProcessEnv, ProcessSpec, SupervisedProcess, Teardown};
use async_trait::async_trait;
use semver::Version;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const PUBSPEC_YAML: &str = "pubspec.yaml";
pub const PUBSPEC_LOCK: &str = "pubspec.lock";
pub const SDK_PACKAGE: &str = "firebase_functions";
pub const STATIC_MANIFEST: &str = ".dart_tool/firebase/functions.yaml";
pub const SERVER_ENTRY: &str = "bin/server.dart";
const GENERATOR_PACKAGE: &str = "build_runner";

const MIN_DISCOVERY_SDK: Version = Version::new(0, 1, 0);

/// Upper bound for a one-off `build_runner build`
const BUILD_TIMEOUT: Duration = Duration::from_secs(600);

pub struct DartDelegate {
    source: SourceDescriptor,
    runtime: RuntimeId,
    config: DelegateConfig,
    sdk_version: SdkVersionCache,
}

impl DartDelegate {
    pub fn try_create(source: &SourceDescriptor, config: &DelegateConfig) -> Result<Option<Self>> {
        if !source.path(PUBSPEC_YAML).exists() {
            debug!(source = %source.source_dir.display(), "no pubspec.yaml; not Dart");
            return Ok(None);
        }

        let runtime = match resolve_runtime(source, LanguageId::Dart, None)? {
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

    /// Locked SDK version, else the declared constraint
    pub async fn sdk_version(&self) -> Option<String> {
        self.sdk_version
            .get_or_resolve(|| resolve_sdk_version(&self.source.source_dir))
            .await
    }

    async fn pubspec(&self) -> Result<Value> {
        let path = self.source.path(PUBSPEC_YAML);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DelegateError::validation(
                format!("Could not read {}: {}", path.display(), e),
                "Make sure pubspec.yaml exists and is readable.",
            )
        })?;
        serde_yaml::from_str(&text).map_err(|e| {
            DelegateError::validation(
                format!("{} is not valid YAML: {}", path.display(), e),
                "Fix the syntax errors in pubspec.yaml.",
            )
        })
    }

    fn base_env(&self) -> ProcessEnv {
        ProcessEnv::inherited().set("GCLOUD_PROJECT", self.source.project_id.as_str())
    }

    fn generator(&self, name: &str, mode: &str, env: ProcessEnv) -> ProcessSpec {
        ProcessSpec::new(name, &self.config.dart_bin)
            .args(["run", GENERATOR_PACKAGE, mode, "--delete-conflicting-outputs"])
            .working_dir(&self.source.source_dir)
            .env(env)
            .grace_period(self.config.grace_period)
    }
}

#[async_trait]
impl RuntimeDelegate for DartDelegate {
    fn language(&self) -> LanguageId {
        LanguageId::Dart
    }

    fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    async fn validate(&self) -> Result<()> {
        let pubspec = self.pubspec().await?;

        if pubspec["dependencies"].get(SDK_PACKAGE).is_none() {
            return Err(DelegateError::validation(
                format!("{} is not listed in pubspec.yaml dependencies", SDK_PACKAGE),
                format!("Run `dart pub add {}`.", SDK_PACKAGE),
            ));
        }
        if pubspec["dev_dependencies"].get(GENERATOR_PACKAGE).is_none() {
            return Err(DelegateError::validation(
                format!(
                    "{} is not listed in pubspec.yaml dev_dependencies",
                    GENERATOR_PACKAGE
                ),
                format!(
                    "Run `dart pub add --dev {}`; it generates the trigger manifest.",
                    GENERATOR_PACKAGE
                ),
            ));
        }

        let entry = self.source.path(SERVER_ENTRY);
        if !file_exists(&entry).await {
            return Err(DelegateError::validation(
                format!("Entry file {} does not exist", entry.display()),
                "Dart functions are served from bin/server.dart.",
            ));
        }
        Ok(())
    }

    async fn build(&self) -> Result<()> {
        let spec = self.generator("build_runner", "build", self.base_env());
        let teardown = Teardown::single(SupervisedProcess::spawn(spec)?);

        with_teardown(&teardown, async {
            match teardown.wait_primary(BUILD_TIMEOUT).await? {
                Some(status) if status.success() => {
                    info!(source = %self.source.source_dir.display(), "build_runner finished");
                    Ok(())
                }
                Some(status) => Err(teardown
                    .primary_error(format!("exited with {}", status))
                    .await),
                None => Err(teardown
                    .primary_error(format!(
                        "did not finish within {}s",
                        BUILD_TIMEOUT.as_secs()
                    ))
                    .await),
            }
        })
        .await
    }

    /// Runs the generator in watch mode next to the dev server.
    ///
    /// If the server fails to start, the watcher is stopped before the
    /// error is returned.
    async fn watch(&self) -> Result<Teardown> {
        let watcher = SupervisedProcess::spawn(self.generator(
            "build_runner-watch",
            "watch",
            self.base_env(),
        ))?;

        let server_spec = ProcessSpec::new("dart-server", &self.config.dart_bin)
            .args(["run", SERVER_ENTRY])
            .working_dir(&self.source.source_dir)
            .env(self.base_env())
            .grace_period(self.config.grace_period);

        match SupervisedProcess::spawn(server_spec) {
            Ok(server) => Ok(Teardown::new(vec![watcher, server])),
            Err(e) => {
                Teardown::single(watcher).run().await;
                Err(e)
            }
        }
    }

    /// Starts the generator with the discovery environment. It exits once
    /// the manifest is written.
    async fn serve(
        &self,
        port: u16,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<Teardown> {
        let process_env = introspection_env(&self.source.project_id, "PORT", port, config, env);
        let spec = self.generator("build_runner", "build", process_env);
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
impl DiscoveryTarget for DartDelegate {
    fn display_name(&self) -> String {
        format!("{} ({})", LanguageId::Dart.name(), self.runtime)
    }

    fn static_manifest_path(&self) -> PathBuf {
        self.source.path(STATIC_MANIFEST)
    }

    fn probe_kind(&self) -> ProbeKind {
        ProbeKind::GeneratorExit
    }

    fn minimum_sdk_version(&self) -> Version {
        MIN_DISCOVERY_SDK
    }

    async fn sdk_version(&self) -> Option<String> {
        DartDelegate::sdk_version(self).await
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
        legacy::scan_dart(&self.source.path(SERVER_ENTRY)).await
    }
}

async fn read_yaml(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    serde_yaml::from_str(&text).ok()
}

/// `pubspec.lock` pins the resolved version. Without it, fall back to the
/// constraint in `pubspec.yaml`. Path and git dependencies carry no
/// version at all.
async fn resolve_sdk_version(source_dir: &Path) -> Option<String> {
    if let Some(locked) = read_yaml(&source_dir.join(PUBSPEC_LOCK)).await.and_then(|lock| {
        lock["packages"][SDK_PACKAGE]["version"]
            .as_str()
            .map(str::to_string)
    }) {
        return Some(locked);
    }

    let pubspec = read_yaml(&source_dir.join(PUBSPEC_YAML)).await?;
    let dependency = pubspec["dependencies"].get(SDK_PACKAGE)?;
    let declared = match dependency {
        Value::String(constraint) => constraint.as_str(),
        Value::Mapping(_) => dependency["version"].as_str()?,
        _ => return None,
    };
    Some(strip_range_operator(declared.trim()).to_string())
}
