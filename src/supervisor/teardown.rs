use super::process::{ShutdownOutcome, SupervisedProcess};
use crate::error::{DelegateError, Result};
use std::future::Future;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Stops every process a `watch`/`serve` call started.
///
/// Cloning shares the same processes. The first [`Teardown::run`] stops
/// them all concurrently. A call that overlaps it waits until it is done,
/// and later calls return immediately. A teardown that started nothing is
/// valid and completes at once.
#[derive(Clone)]
pub struct Teardown {
    inner: Arc<Inner>,
}

struct Inner {
    processes: Mutex<Option<Vec<SupervisedProcess>>>,
    completed: AtomicBool,
    shutdowns: AtomicUsize,
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("completed", &self.is_complete())
            .finish()
    }
}

impl Teardown {
    pub fn new(processes: Vec<SupervisedProcess>) -> Self {
        Self {
            inner: Arc::new(Inner {
                processes: Mutex::new(Some(processes)),
                completed: AtomicBool::new(false),
                shutdowns: AtomicUsize::new(0),
            }),
        }
    }

    pub fn single(process: SupervisedProcess) -> Self {
        Self::new(vec![process])
    }

    /// Teardown for a call that started nothing
    pub fn noop() -> Self {
        Self::new(Vec::new())
    }

    /// Stops all processes. Idempotent, and always resolves.
    ///
    /// The process list stays locked until every shutdown has finished, so
    /// no caller returns while a process is still running.
    pub async fn run(&self) {
        let mut guard = self.inner.processes.lock().await;
        let Some(processes) = guard.take() else {
            debug!("teardown already ran");
            return;
        };

        let mut shutdowns = JoinSet::new();
        for process in processes {
            self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
            shutdowns.spawn(async move {
                let name = process.name().to_string();
                (name, process.shutdown().await)
            });
        }

        while let Some(joined) = shutdowns.join_next().await {
            match joined {
                Ok((name, ShutdownOutcome::Unknown)) => {
                    warn!(process = %name, "process state unknown after shutdown");
                }
                Ok((name, outcome)) => debug!(process = %name, ?outcome, "stopped"),
                Err(e) => warn!(error = %e, "shutdown task failed"),
            }
        }

        self.inner.completed.store(true, Ordering::SeqCst);
        drop(guard);
    }

    pub fn is_complete(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Number of process shutdowns this teardown has performed
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }

    /// Waits for the first process to exit on its own, up to `limit`.
    ///
    /// Used by generator-style discovery, where the answer is the process
    /// finishing, and by HTTP discovery to notice a server that crashed. `Ok(None)` means it is still running when the limit hit.
    pub async fn wait_primary(&self, limit: Duration) -> Result<Option<ExitStatus>> {
        let mut guard = self.inner.processes.lock().await;
        let primary = guard
            .as_mut()
            .and_then(|processes| processes.first_mut())
            .ok_or_else(|| {
                DelegateError::InternalConsistency(
                    "no process to wait on; it was never started or already torn down"
                        .to_string(),
                )
            })?;
        primary.wait_timeout(limit).await
    }

    /// Process error for the first process, with its stderr tail.
    pub async fn primary_error(&self, message: impl Into<String>) -> DelegateError {
        let message = message.into();
        let guard = self.inner.processes.lock().await;
        match guard.as_ref().and_then(|processes| processes.first()) {
            Some(primary) => primary.error(message),
            None => DelegateError::Process {
                name: "unknown".to_string(),
                message,
                stderr_tail: Vec::new(),
            },
        }
    }
}

/// Runs `body`, then the teardown, whatever `body` returned.
///
/// The teardown always runs to completion before the output is handed
/// back, so no process outlives the call.
pub async fn with_teardown<F, T>(teardown: &Teardown, body: F) -> T
where
    F: Future<Output = T>,
{
    let output = body.await;
    teardown.run().await;
    output
}
