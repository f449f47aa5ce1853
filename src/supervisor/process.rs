use super::env::ProcessEnv;
use crate::error::{DelegateError, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Lines of stderr kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Bound on the quit request itself, separate from the grace period
const QUIT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for output readers once the child is gone
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// First step of shutdown, before the forced kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownProtocol {
    /// GET this URL and let the process exit on its own
    QuitRequest { url: String },
    /// SIGTERM on unix; no cooperative step elsewhere
    Terminate,
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: ProcessEnv,
    pub shutdown: ShutdownProtocol,
    pub grace_period: Duration,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: ProcessEnv::empty(),
            shutdown: ShutdownProtocol::Terminate,
            grace_period: Duration::from_secs(10),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn env(mut self, env: ProcessEnv) -> Self {
        self.env = env;
        self
    }

    pub fn shutdown(mut self, shutdown: ShutdownProtocol) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The process had already exited before shutdown began
    AlreadyExited(ExitStatus),
    /// The process exited within the grace period
    Exited(ExitStatus),
    /// The grace period elapsed and the process was killed
    Killed,
    /// The process state could not be determined
    Unknown,
}

/// A running child process owned by exactly one caller.
///
/// The child is spawned with `kill_on_drop`, so dropping a handle without
/// calling [`SupervisedProcess::shutdown`] still reaps it.
pub struct SupervisedProcess {
    name: String,
    child: Child,
    shutdown: ShutdownProtocol,
    grace_period: Duration,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("name", &self.name)
            .field("pid", &self.child.id())
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl SupervisedProcess {
    pub fn spawn(spec: ProcessSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .env_clear()
            .envs(spec.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| DelegateError::Process {
            name: spec.name.clone(),
            message: format!("failed to start {}: {}", spec.program.display(), e),
            stderr_tail: Vec::new(),
        })?;

        info!(
            process = %spec.name,
            pid = child.id().unwrap_or(0),
            "started {} {}",
            spec.program.display(),
            spec.args.join(" ")
        );

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                spec.name.clone(),
                stdout,
                Stream::Stdout,
                None,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                spec.name.clone(),
                stderr,
                Stream::Stderr,
                Some(Arc::clone(&stderr_tail)),
            )));
        }

        Ok(Self {
            name: spec.name,
            child,
            shutdown: spec.shutdown,
            grace_period: spec.grace_period,
            stderr_tail,
            readers,
            exit_status: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Non-blocking exit check.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit_status = Some(status);
            }
        }
        self.exit_status
    }

    /// Waits for the process to exit, up to `limit`. `Ok(None)` means it is
    /// still running.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        match timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(process = %self.name, %status, "exited");
                self.exit_status = Some(status);
                // stderr tail must be complete before anyone builds an error from it
                self.drain_readers().await;
                Ok(Some(status))
            }
            Ok(Err(e)) => Err(self.error(format!("failed to wait for exit: {}", e))),
            Err(_) => Ok(None),
        }
    }

    /// Builds a process error carrying the captured stderr tail.
    pub fn error(&self, message: impl Into<String>) -> DelegateError {
        DelegateError::Process {
            name: self.name.clone(),
            message: message.into(),
            stderr_tail: self.stderr_tail(),
        }
    }

    /// Cooperative stop, then a forced kill after the grace period.
    ///
    /// Never fails: problems are logged and reflected in the outcome.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        if let Some(status) = self.try_exit_status() {
            self.drain_readers().await;
            return ShutdownOutcome::AlreadyExited(status);
        }

        match self.shutdown.clone() {
            ShutdownProtocol::QuitRequest { url } => send_quit_request(&self.name, &url).await,
            ShutdownProtocol::Terminate => self.terminate(),
        }

        let outcome = match timeout(self.grace_period, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(process = %self.name, %status, "exited after shutdown request");
                ShutdownOutcome::Exited(status)
            }
            Ok(Err(e)) => {
                warn!(process = %self.name, error = %e, "failed to wait for exit, killing");
                self.force_kill().await
            }
            Err(_) => {
                warn!(
                    process = %self.name,
                    "did not exit within {}ms, killing",
                    self.grace_period.as_millis()
                );
                self.force_kill().await
            }
        };

        self.drain_readers().await;
        outcome
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.child.id() {
            debug!(process = %self.name, pid, "sending SIGTERM");
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(process = %self.name, "failed to send SIGTERM: {e}");
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(process = %self.name, "failed to terminate: {e}");
        }
    }

    async fn force_kill(&mut self) -> ShutdownOutcome {
        match self.child.kill().await {
            Ok(()) => ShutdownOutcome::Killed,
            Err(e) => {
                warn!(process = %self.name, error = %e, "failed to kill");
                ShutdownOutcome::Unknown
            }
        }
    }

    async fn drain_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                // a grandchild may still hold the pipe open
                abort.abort();
            }
        }
    }
}

async fn send_quit_request(name: &str, url: &str) {
    debug!(process = %name, url, "requesting shutdown");
    let client = match reqwest::Client::builder()
        .timeout(QUIT_REQUEST_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(process = %name, error = %e, "could not build HTTP client for quit request");
            return;
        }
    };
    if let Err(e) = client.get(url).send().await {
        debug!(process = %name, error = %e, "quit request failed");
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(
    name: String,
    reader: R,
    stream: Stream,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream {
            Stream::Stdout => debug!(process = %name, "{}", line),
            Stream::Stderr => info!(process = %name, "{}", line),
        }
        if let Some(tail) = &tail {
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(name: &str, script: &str) -> ProcessSpec {
        ProcessSpec::new(name, "/bin/sh")
            .args(["-c", script])
            .env(ProcessEnv::inherited())
            .grace_period(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_binary() {
        let err = SupervisedProcess::spawn(ProcessSpec::new("bad", "/nonexistent/binary"))
            .unwrap_err();
        assert!(matches!(err, DelegateError::Process { .. }));
    }

    #[tokio::test]
    async fn test_env_is_not_inherited_wholesale() {
        std::env::set_var("RTDELEGATE_TEST_LEAK", "1");
        let spec = sh(
            "env-test",
            "test -z \"$RTDELEGATE_TEST_LEAK\" && test \"$EXPLICIT\" = yes",
        )
        .env(ProcessEnv::inherited().set("EXPLICIT", "yes"));
        let mut proc = SupervisedProcess::spawn(spec).unwrap();
        let status = proc.wait_timeout(Duration::from_secs(5)).await.unwrap();
        assert!(status.unwrap().success());
    }

    #[tokio::test]
    async fn test_stderr_tail_captured() {
        let mut proc = SupervisedProcess::spawn(sh("noisy", "echo first >&2; echo second >&2; exit 3"))
            .unwrap();
        let status = proc.wait_timeout(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(status.code(), Some(3));
        proc.drain_readers().await;
        assert_eq!(proc.stderr_tail(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_terminate_within_grace_period() {
        let proc = SupervisedProcess::spawn(sh("sleeper", "exec sleep 30")).unwrap();
        let outcome = proc.shutdown().await;
        assert!(matches!(outcome, ShutdownOutcome::Exited(_)));
    }

    #[tokio::test]
    async fn test_kill_after_grace_period() {
        let proc = SupervisedProcess::spawn(sh(
            "stubborn",
            "trap '' TERM; while true; do sleep 0.05; done",
        ))
        .unwrap();
        // give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(100)).await;
        let outcome = proc.shutdown().await;
        assert_eq!(outcome, ShutdownOutcome::Killed);
    }

    #[tokio::test]
    async fn test_shutdown_of_exited_process() {
        let mut proc = SupervisedProcess::spawn(sh("quick", "exit 0")).unwrap();
        proc.wait_timeout(Duration::from_secs(5)).await.unwrap();
        let outcome = proc.shutdown().await;
        assert!(matches!(outcome, ShutdownOutcome::AlreadyExited(s) if s.success()));
    }

    #[tokio::test]
    async fn test_quit_request_to_dead_port_still_resolves() {
        let spec = sh("no-server", "exec sleep 30").shutdown(ShutdownProtocol::QuitRequest {
            url: "http://127.0.0.1:9/__/quitquitquit".to_string(),
        });
        let proc = SupervisedProcess::spawn(spec).unwrap();
        let outcome = proc.shutdown().await;
        assert_eq!(outcome, ShutdownOutcome::Killed);
    }
}
