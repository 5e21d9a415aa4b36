//! # Process ownership and termination.
//!
//! [`SupervisedProcess`] owns the spawned child for the whole run: exactly
//! one live handle exists per run, and only the supervisor touches it.
//! Subscribers get a [`ProcessHandle`] instead: the platform pid plus a
//! shared liveness flag the supervisor maintains.
//!
//! ## Termination sequence (unix)
//! ```text
//! SIGTERM → process group
//!    │ wait up to kill_grace
//!    └─ still alive → SIGKILL → process group, then reap
//! ```
//! The child is spawned into its own process group so descendants die with it.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::RunError;

use super::context::RunContext;
use super::launch::LaunchSpec;

/// Cloneable, read-only view of the supervised process.
///
/// Carried by checkpoint events; lets subscribers check liveness and address
/// the process by pid without ever owning the child handle.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    pid: u32,
    alive: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Native (platform) process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True until the supervisor observes the process exit.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_exited(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// The supervisor's exclusive ownership of one spawned child.
pub(crate) struct SupervisedProcess {
    child: Child,
    handle: ProcessHandle,
}

impl SupervisedProcess {
    /// Spawns the process described by `spec`, redirecting its combined
    /// stdout/stderr into the run's log file.
    pub(crate) fn spawn(spec: &LaunchSpec, ctx: &RunContext) -> Result<Self, RunError> {
        let spawn_err = |source: std::io::Error| RunError::Spawn {
            executable: spec.executable().display().to_string(),
            source,
        };

        let log = std::fs::File::create(ctx.log_file()).map_err(spawn_err)?;
        let log_err = log.try_clone().map_err(spawn_err)?;

        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.args())
            .envs(spec.env())
            .current_dir(spec.work_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(spawn_err)?;
        let pid = child.id().ok_or_else(|| {
            spawn_err(std::io::Error::other("process exited before a pid was observed"))
        })?;

        debug!(run = ctx.name(), pid, exe = %spec.executable().display(), "process spawned");
        Ok(Self {
            child,
            handle: ProcessHandle::new(pid),
        })
    }

    /// Shared read-only view for events and subscribers.
    pub(crate) fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// Waits for the process to exit, bounded by `timeout`.
    ///
    /// Returns `Some(status)` on in-time exit (the liveness flag flips before
    /// returning) and `None` when the timeout elapsed with the process still
    /// alive.
    pub(crate) async fn wait_with_timeout(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.handle.mark_exited();
                Some(status)
            }
            Ok(Err(e)) => {
                // wait() failing means the handle is unusable; treat as exited.
                warn!(pid = self.handle.pid(), "waiting on process failed: {e}");
                self.handle.mark_exited();
                None
            }
            Err(_elapsed) => None,
        }
    }

    /// Terminates the process and its descendants: graceful signal first,
    /// escalating to a forced kill when the grace period passes.
    pub(crate) async fn terminate(&mut self, grace: Duration) {
        let pid = self.handle.pid();

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                warn!(pid, "SIGTERM to process group failed: {e}");
            }
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(_) => {
                    debug!(pid, "process exited within grace period");
                }
                Err(_elapsed) => {
                    warn!(pid, grace = ?grace, "grace period exceeded, sending SIGKILL");
                    let _ = killpg(pgid, Signal::SIGKILL);
                    let _ = self.child.wait().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = grace;
            if let Err(e) = self.child.start_kill() {
                warn!(pid, "kill failed: {e}");
            }
            let _ = self.child.wait().await;
        }

        self.handle.mark_exited();
    }
}
