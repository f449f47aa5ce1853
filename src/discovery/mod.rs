//! Trigger discovery protocol
//!
//! Produces a [`BuildDescription`] without loading user code into this
//! process. Strategies, first success wins:
//!
//! 1. **Version gate**: an SDK that is missing, unparseable or older than
//!    the ecosystem minimum cannot speak the manifest protocol, so its
//!    entry points are scanned statically instead. Only the outdated case
//!    warns.
//! 2. **Static manifest**: a previously generated `functions.yaml` at a
//!    fixed path under the source tree.
//! 3. **Live discovery**: run user code in a subprocess on a fresh port and
//!    ask it, either over HTTP or by letting a generator write the static
//!    manifest. The subprocess is always torn down before returning.

pub mod http;
pub mod legacy;
pub mod static_file;
pub mod version;

use crate::error::{DelegateError, Result};
use crate::output::BuildDescription;
use crate::supervisor::{find_available_port, with_teardown, Teardown};
use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use version::VersionGate;

/// Values serialized into the runtime config blob for user code
pub type RuntimeConfigValues = serde_json::Map<String, serde_json::Value>;

/// Environment and secret bindings exposed to user code
pub type EnvBindings = BTreeMap<String, String>;

/// How a started discovery process is asked for its manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Long-lived dev server answering `GET /__/functions.yaml`
    Http,
    /// Code generator that writes the static manifest and exits
    GeneratorExit,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub base_port: u16,
    /// Bound on one probe, local to the spawned process
    pub timeout: Duration,
}

impl From<&crate::config::DelegateConfig> for DiscoveryOptions {
    fn from(config: &crate::config::DelegateConfig) -> Self {
        Self {
            base_port: config.base_port,
            timeout: config.discovery_timeout,
        }
    }
}

/// The per-ecosystem pieces the protocol needs
#[async_trait]
pub trait DiscoveryTarget: Send + Sync {
    /// Name used in logs and warnings
    fn display_name(&self) -> String;

    fn static_manifest_path(&self) -> PathBuf;

    fn probe_kind(&self) -> ProbeKind;

    fn minimum_sdk_version(&self) -> Version;

    /// Raw SDK version as declared by the source, if any
    async fn sdk_version(&self) -> Option<String>;

    /// Starts the serve or generate process on `port`
    async fn start_discovery_process(
        &self,
        port: u16,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<Teardown>;

    /// Static analysis of entry points for SDKs that predate the manifest
    async fn legacy_scan(&self) -> Result<BuildDescription>;
}

pub async fn discover_build<T>(
    target: &T,
    config: &RuntimeConfigValues,
    env: &EnvBindings,
    options: &DiscoveryOptions,
) -> Result<BuildDescription>
where
    T: DiscoveryTarget + ?Sized,
{
    let minimum = target.minimum_sdk_version();
    let sdk_version = target.sdk_version().await;
    match VersionGate::evaluate(sdk_version.as_deref(), &minimum) {
        VersionGate::Supported(found) => {
            debug!(delegate = %target.display_name(), sdk = %found, "using manifest discovery");
        }
        VersionGate::Outdated { found, minimum } => {
            warn!(
                "{} uses an outdated functions SDK ({}). Version {} or later is required for \
                 manifest discovery; falling back to source scanning. Upgrade the SDK to get \
                 full trigger support.",
                target.display_name(),
                found,
                minimum
            );
            return target.legacy_scan().await;
        }
        VersionGate::Unparseable(raw) => {
            debug!(
                delegate = %target.display_name(),
                sdk = %raw,
                "SDK version is not a semantic version; using source scanning"
            );
            return target.legacy_scan().await;
        }
        VersionGate::Missing => {
            debug!(delegate = %target.display_name(), "no SDK version declared; using source scanning");
            return target.legacy_scan().await;
        }
    }

    let manifest_path = target.static_manifest_path();
    if let Some(build) = static_file::detect_from_yaml(&manifest_path).await? {
        info!(
            delegate = %target.display_name(),
            path = %manifest_path.display(),
            "discovered {} endpoint(s) from static manifest",
            build.endpoints.len()
        );
        return Ok(build);
    }

    let port = find_available_port(options.base_port).await?;
    debug!(delegate = %target.display_name(), port, "starting live discovery");
    let teardown = target.start_discovery_process(port, config, env).await?;

    let build = with_teardown(&teardown, query_process(target, &teardown, port, options)).await?;
    info!(
        delegate = %target.display_name(),
        "discovered {} endpoint(s) from live discovery",
        build.endpoints.len()
    );
    Ok(build)
}

async fn query_process<T>(
    target: &T,
    teardown: &Teardown,
    port: u16,
    options: &DiscoveryOptions,
) -> Result<BuildDescription>
where
    T: DiscoveryTarget + ?Sized,
{
    match target.probe_kind() {
        ProbeKind::Http => {
            tokio::select! {
                biased;
                build = http::detect_from_port(port, options.timeout) => build,
                status = primary_exit(teardown, options.timeout) => {
                    let url = http::introspection_url(port, http::MANIFEST_PATH);
                    Err(teardown
                        .primary_error(format!("exited with {} before answering {}", status, url))
                        .await)
                }
            }
        }
        ProbeKind::GeneratorExit => {
            let manifest_path = target.static_manifest_path();
            let attempted = manifest_path.display().to_string();
            match teardown.wait_primary(options.timeout).await? {
                Some(status) if status.success() => {
                    static_file::detect_from_yaml(&manifest_path)
                        .await?
                        .ok_or_else(|| {
                            DelegateError::discovery(
                                "the generator finished but did not write a trigger manifest",
                                attempted,
                                "Make sure the functions SDK code generator is configured for this project.",
                            )
                        })
                }
                Some(status) => {
                    let cause = teardown
                        .primary_error(format!("exited with {}", status))
                        .await;
                    warn!("{}", cause.help_message());
                    Err(DelegateError::discovery(
                        format!("the generator exited with {}, so no trigger manifest was produced", status),
                        attempted,
                        "Check that the SDK and build_runner are listed as dependencies and that the project builds.",
                    ))
                }
                None => Err(DelegateError::discovery(
                    format!(
                        "the generator did not finish within {}ms",
                        options.timeout.as_millis()
                    ),
                    attempted,
                    "Increase RTDELEGATE_DISCOVERY_TIMEOUT_MS if the project is large.",
                )),
            }
        }
    }
}

/// Resolves once the primary process exits on its own. Never resolves if
/// there is nothing to wait on.
async fn primary_exit(teardown: &Teardown, poll: Duration) -> ExitStatus {
    loop {
        match teardown.wait_primary(poll).await {
            Ok(Some(status)) => return status,
            Ok(None) => continue,
            Err(_) => std::future::pending::<()>().await,
        }
    }
}
