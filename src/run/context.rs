//! # Run-scoped directory layout.
//!
//! [`RunContext`] names one supervised run and owns its artifact directories.
//! Every diagnostic artifact (logs, thread dumps, memory dumps, screenshots)
//! is written under the run's own directory tree, and no two runs (retries
//! included) may share one: [`RunContext::create`] suffixes the launch
//! directory until it finds a fresh path.
//!
//! ## Layout
//! ```text
//! <root>/<name>/
//!   log/                     process output + diagnostic text artifacts
//!     run.log                combined stdout/stderr of the supervised process
//!     screenshots/
//!     monitoring-thread-dumps-<process>/
//!   snapshots/               memory dumps, profiler snapshots
//!   reports/                 collaborator-produced reports
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::ConfigError;

struct Inner {
    name: String,
    launch_dir: PathBuf,
    logs_dir: PathBuf,
    snapshots_dir: PathBuf,
    reports_dir: PathBuf,
}

/// Identity and artifact layout of one supervised run.
///
/// Cheap to clone (shared immutable inner); carried by every checkpoint
/// event so subscribers can place artifacts without knowing the supervisor.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<Inner>,
}

impl RunContext {
    /// Creates the run-scoped directory tree under `root`.
    ///
    /// If `<root>/<name>` already exists (a previous run or a retry), a
    /// numeric suffix is appended until an unused directory is found, so two
    /// runs never write into the same tree.
    pub fn create(root: impl AsRef<Path>, name: &str) -> Result<Self, ConfigError> {
        let launch_dir = Self::claim_dir(root.as_ref(), name)?;
        let logs_dir = launch_dir.join("log");
        let snapshots_dir = launch_dir.join("snapshots");
        let reports_dir = launch_dir.join("reports");
        for dir in [&logs_dir, &snapshots_dir, &reports_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::InvalidValue {
                field: "root",
                reason: format!("cannot create {}: {e}", dir.display()),
            })?;
        }
        debug!(run = name, dir = %launch_dir.display(), "created run directories");
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                launch_dir,
                logs_dir,
                snapshots_dir,
                reports_dir,
            }),
        })
    }

    fn claim_dir(root: &Path, name: &str) -> Result<PathBuf, ConfigError> {
        let mut candidate = root.join(name);
        let mut attempt = 1u32;
        while candidate.exists() {
            attempt += 1;
            candidate = root.join(format!("{name}-{attempt}"));
        }
        std::fs::create_dir_all(&candidate).map_err(|e| ConfigError::InvalidValue {
            field: "root",
            reason: format!("cannot create {}: {e}", candidate.display()),
        })?;
        Ok(candidate)
    }

    /// Run name (test name plus launch name, by convention).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Root directory of this run's artifacts.
    pub fn launch_dir(&self) -> &Path {
        &self.inner.launch_dir
    }

    /// Directory for process output and diagnostic text artifacts.
    pub fn logs_dir(&self) -> &Path {
        &self.inner.logs_dir
    }

    /// Directory for memory dumps and profiler snapshots.
    pub fn snapshots_dir(&self) -> &Path {
        &self.inner.snapshots_dir
    }

    /// Directory for collaborator-produced reports.
    pub fn reports_dir(&self) -> &Path {
        &self.inner.reports_dir
    }

    /// Combined stdout/stderr of the supervised process.
    pub fn log_file(&self) -> PathBuf {
        self.inner.logs_dir.join("run.log")
    }

    /// Directory for screenshots taken around abnormal termination.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.inner.logs_dir.join("screenshots")
    }

    /// Thread-dump directory for the liveness-monitoring loop.
    pub fn monitoring_dir(&self, process_name: &str) -> PathBuf {
        self.inner
            .logs_dir
            .join(format!("monitoring-thread-dumps-{process_name}"))
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("name", &self.inner.name)
            .field("launch_dir", &self.inner.launch_dir)
            .finish()
    }
}
