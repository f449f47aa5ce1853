//! runtime-delegates - language delegates and trigger discovery for functions codebases
//!
//! A deployment tool has to learn which functions a source directory
//! declares without importing that code into its own process. This crate
//! does it through one delegate per language ecosystem and a discovery
//! protocol that runs user code only in supervised subprocesses.
//!
//! # Core Concepts
//!
//! - **Delegate**: per-ecosystem implementation of validate, build, watch,
//!   serve and discover ([`RuntimeDelegate`])
//! - **Discovery**: static manifest first, then a live subprocess probed
//!   over HTTP or by waiting for a code generator, with source scanning
//!   for SDKs too old for either ([`discovery`])
//! - **Supervisor**: child processes with an explicit environment and an
//!   idempotent teardown that always resolves ([`supervisor`])
//!
//! # Example Usage
//!
//! ```no_run
//! use runtime_delegates::{try_create_delegate, DelegateConfig, SourceDescriptor};
//!
//! # async fn example() -> Result<(), runtime_delegates::DelegateError> {
//! let source = SourceDescriptor::new("my-project", ".", "functions");
//! let config = DelegateConfig::default();
//!
//! match try_create_delegate(&source, &config)? {
//!     Some(delegate) => {
//!         delegate.validate().await?;
//!         let build = delegate
//!             .discover_build(&Default::default(), &Default::default())
//!             .await?;
//!         for (id, endpoint) in &build.endpoints {
//!             println!("{}: {}", id, endpoint.trigger);
//!         }
//!     }
//!     None => println!("no supported language found"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod delegate;
pub mod discovery;
pub mod error;
pub mod output;
pub mod runtime;
pub mod supervisor;
pub mod util;

pub use config::{ConfigError, DelegateConfig};
pub use delegate::{
    get_runtime_delegate, try_create_delegate, DartDelegate, NodeDelegate, PythonDelegate,
    RuntimeDelegate, SourceDescriptor,
};
pub use discovery::{discover_build, DiscoveryTarget, EnvBindings, RuntimeConfigValues};
pub use error::{DelegateError, Result};
pub use output::{BuildDescription, Endpoint, Trigger};
pub use runtime::{LanguageId, RuntimeId};
pub use supervisor::{with_teardown, Teardown};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
