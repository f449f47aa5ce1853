//! Local process supervisor
//!
//! Spawns tooling and user code as child processes with an explicit
//! environment, forwards their output to `tracing`, and hands back a
//! [`Teardown`] that stops them: cooperative request first, forced kill
//! after the grace period.

pub mod env;
pub mod port;
pub mod process;
pub mod teardown;

pub use env::ProcessEnv;
pub use port::find_available_port;
pub use process::{ProcessSpec, ShutdownOutcome, ShutdownProtocol, SupervisedProcess};
pub use teardown::{with_teardown, Teardown};
