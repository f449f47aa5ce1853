//! Runtime delegates
//!
//! One delegate per language ecosystem, all behind [`RuntimeDelegate`]. The
//! orchestrator calls [`try_create_delegate`] and gets back whichever
//! ecosystem claims the source directory, or `None` when nothing does.
//!
//! # Example
//!
//! ```no_run
//! use runtime_delegates::{try_create_delegate, DelegateConfig, SourceDescriptor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SourceDescriptor::new("demo-project", "/work/app", "/work/app/functions");
//! let config = DelegateConfig::default();
//!
//! if let Some(delegate) = try_create_delegate(&source, &config)? {
//!     delegate.validate().await?;
//!     let build = delegate
//!         .discover_build(&Default::default(), &Default::default())
//!         .await?;
//!     println!("{} endpoints", build.endpoints.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod dart;
pub mod node;
pub mod python;
pub mod sdk;

pub use dart::DartDelegate;
pub use node::NodeDelegate;
pub use python::PythonDelegate;
pub use sdk::SdkVersionCache;

use crate::config::DelegateConfig;
use crate::discovery::{EnvBindings, RuntimeConfigValues};
use crate::error::{DelegateError, Result};
use crate::output::BuildDescription;
use crate::runtime::{LanguageId, RuntimeId};
use crate::supervisor::env::CONTROL_API_VAR;
use crate::supervisor::{ProcessEnv, Teardown};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a functions codebase lives. Immutable input to delegate creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub project_id: String,
    pub project_dir: PathBuf,
    pub source_dir: PathBuf,
    pub declared_runtime: Option<String>,
}

impl SourceDescriptor {
    pub fn new(
        project_id: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            project_dir: project_dir.into(),
            source_dir: source_dir.into(),
            declared_runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.declared_runtime = Some(runtime.into());
        self
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.source_dir.join(relative)
    }
}

/// Uniform lifecycle contract every ecosystem implements
#[async_trait]
pub trait RuntimeDelegate: Send + Sync {
    fn language(&self) -> LanguageId;

    fn runtime(&self) -> RuntimeId;

    fn source(&self) -> &SourceDescriptor;

    /// Structural checks on the source. Never modifies it.
    async fn validate(&self) -> Result<()>;

    /// Optional compile or codegen step. Safe to repeat.
    async fn build(&self) -> Result<()>;

    /// Starts background processes for local development.
    async fn watch(&self) -> Result<Teardown>;

    /// Starts a process answering introspection requests on `port`.
    async fn serve(
        &self,
        port: u16,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<Teardown>;

    async fn discover_build(
        &self,
        config: &RuntimeConfigValues,
        env: &EnvBindings,
    ) -> Result<BuildDescription>;
}

type Factory = fn(&SourceDescriptor, &DelegateConfig) -> Result<Option<Box<dyn RuntimeDelegate>>>;

/// Probe order; the first ecosystem to claim the source wins
const FACTORIES: &[(LanguageId, Factory)] = &[
    (LanguageId::Node, |source, config| {
        Ok(NodeDelegate::try_create(source, config)?.map(|d| Box::new(d) as Box<dyn RuntimeDelegate>))
    }),
    (LanguageId::Python, |source, config| {
        Ok(PythonDelegate::try_create(source, config)?
            .map(|d| Box::new(d) as Box<dyn RuntimeDelegate>))
    }),
    (LanguageId::Dart, |source, config| {
        Ok(DartDelegate::try_create(source, config)?.map(|d| Box::new(d) as Box<dyn RuntimeDelegate>))
    }),
];

/// Asks every registered ecosystem in turn.
///
/// `Ok(None)` means no ecosystem recognized the directory. An error means
/// one did, but the source is malformed (for example an unsupported
/// declared runtime).
pub fn try_create_delegate(
    source: &SourceDescriptor,
    config: &DelegateConfig,
) -> Result<Option<Box<dyn RuntimeDelegate>>> {
    for (language, factory) in FACTORIES {
        if let Some(delegate) = factory(source, config)? {
            debug!(
                language = %language,
                runtime = %delegate.runtime(),
                source = %source.source_dir.display(),
                "delegate claimed source"
            );
            return Ok(Some(delegate));
        }
    }
    debug!(source = %source.source_dir.display(), "no delegate claimed source");
    Ok(None)
}

/// Like [`try_create_delegate`], but "nothing claimed it" is a validation
/// error for callers that need a delegate.
pub fn get_runtime_delegate(
    source: &SourceDescriptor,
    config: &DelegateConfig,
) -> Result<Box<dyn RuntimeDelegate>> {
    try_create_delegate(source, config)?.ok_or_else(|| {
        DelegateError::validation(
            format!(
                "Could not detect the language of the functions source in {}",
                source.source_dir.display()
            ),
            "Add a package.json (Node.js), requirements.txt (Python) or pubspec.yaml (Dart) to the functions directory.",
        )
    })
}

/// Outcome of runtime resolution for one ecosystem
pub(crate) enum RuntimeResolution {
    Resolved(RuntimeId),
    /// The declared runtime belongs to a different ecosystem
    OtherEcosystem,
}

/// Resolves the runtime a delegate targets: declared, then `fallback`,
/// then the newest supported one for `language`.
pub(crate) fn resolve_runtime(
    source: &SourceDescriptor,
    language: LanguageId,
    fallback: Option<RuntimeId>,
) -> Result<RuntimeResolution> {
    let runtime = match &source.declared_runtime {
        Some(declared) => {
            let runtime = RuntimeId::parse_supported(declared)?;
            if runtime.language() != language {
                return Ok(RuntimeResolution::OtherEcosystem);
            }
            runtime
        }
        None => fallback.unwrap_or_else(|| RuntimeId::latest(language)),
    };

    if runtime.language() != language {
        return Err(DelegateError::InternalConsistency(format!(
            "{} source resolved to {} runtime '{}'",
            language.name(),
            runtime.language().name(),
            runtime
        )));
    }

    if runtime.is_deprecated() {
        tracing::warn!(
            "Runtime {} is deprecated and will be decommissioned. Upgrade to {}.",
            runtime,
            RuntimeId::latest(language)
        );
    }
    Ok(RuntimeResolution::Resolved(runtime))
}

/// Environment for a serve or discovery process.
///
/// Caller bindings go first so the protocol variables always win.
pub(crate) fn introspection_env(
    project_id: &str,
    port_var: &str,
    port: u16,
    config: &RuntimeConfigValues,
    env: &EnvBindings,
) -> ProcessEnv {
    ProcessEnv::inherited()
        .extend(env.clone())
        .set("GCLOUD_PROJECT", project_id)
        .set(port_var, port.to_string())
        .set(CONTROL_API_VAR, "true")
        .with_runtime_config(config)
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> SourceDescriptor {
        SourceDescriptor::new("demo", dir.path(), dir.path())
    }

    #[test]
    fn test_no_marker_yields_no_delegate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "# nothing here").unwrap();

        let delegate = try_create_delegate(&source(&dir), &DelegateConfig::default()).unwrap();
        assert!(delegate.is_none());
    }

    #[test]
    fn test_get_runtime_delegate_requires_a_match() {
        let dir = TempDir::new().unwrap();
        let err = get_runtime_delegate(&source(&dir), &DelegateConfig::default()).err().expect("expected an error");
        assert!(matches!(err, DelegateError::Validation { .. }));
    }

    #[test]
    fn test_resolve_runtime_defaults_to_latest() {
        let dir = TempDir::new().unwrap();
        let resolution = resolve_runtime(&source(&dir), LanguageId::Python, None).unwrap();
        assert!(matches!(
            resolution,
            RuntimeResolution::Resolved(RuntimeId::Python313)
        ));
    }

    #[test]
    fn test_resolve_runtime_prefers_declared() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir).with_runtime("nodejs20");
        let resolution =
            resolve_runtime(&src, LanguageId::Node, Some(RuntimeId::Nodejs22)).unwrap();
        assert!(matches!(
            resolution,
            RuntimeResolution::Resolved(RuntimeId::Nodejs20)
        ));
    }

    #[test]
    fn test_resolve_runtime_other_ecosystem() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir).with_runtime("dart3");
        let resolution = resolve_runtime(&src, LanguageId::Node, None).unwrap();
        assert!(matches!(resolution, RuntimeResolution::OtherEcosystem));
    }

    #[test]
    fn test_resolve_runtime_fallback_from_wrong_ecosystem_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_runtime(&source(&dir), LanguageId::Node, Some(RuntimeId::Dart3))
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resolve_runtime_unsupported() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir).with_runtime("nodejs8");
        let err = resolve_runtime(&src, LanguageId::Node, None).err().unwrap();
        assert!(matches!(err, DelegateError::UnsupportedRuntime { .. }));
    }

    #[test]
    fn test_introspection_env_protocol_vars_win() {
        let mut env = EnvBindings::new();
        env.insert("PORT".to_string(), "1".to_string());
        env.insert("API_URL".to_string(), "https://example.test".to_string());

        let process_env = introspection_env("demo", "PORT", 8081, &Default::default(), &env);

        assert_eq!(process_env.get("PORT"), Some("8081"));
        assert_eq!(process_env.get("API_URL"), Some("https://example.test"));
        assert_eq!(process_env.get(CONTROL_API_VAR), Some("true"));
        assert_eq!(process_env.get("GCLOUD_PROJECT"), Some("demo"));
        assert!(!process_env.contains(crate::supervisor::env::RUNTIME_CONFIG_VAR));
    }
}
