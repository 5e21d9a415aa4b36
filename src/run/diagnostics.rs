//! # Forensic capture around abnormal termination.
//!
//! [`DiagnosticCapture`] runs at the before-kill checkpoint (and on demand
//! via [`ProcessExceptionEvent`](super::events::ProcessExceptionEvent)). Each
//! sub-step (screenshot, thread dump, conditional memory dump) is caught
//! independently: no failure aborts the others, all are logged, and none is
//! ever fatal to the run.
//!
//! ## Memory-dump policy
//! A memory dump is captured only when the log stream already contains the
//! configured low-memory marker. Capturing unconditionally would be
//! prohibitively expensive; the heuristic trades completeness for cost.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::config::SupervisorConfig;
use crate::error::ProbeError;

use super::collab::{DumpProbe, PidResolver, ScreenshotProbe};
use super::context::RunContext;
use super::process::ProcessHandle;

/// Best-effort collector of thread dumps, memory dumps, and screenshots.
pub struct DiagnosticCapture {
    dump: Arc<dyn DumpProbe>,
    screenshot: Arc<dyn ScreenshotProbe>,
    resolver: Arc<dyn PidResolver>,
    runtime_home: Option<PathBuf>,
    low_memory_marker: String,
    resolve_attempts: u32,
    resolve_delay: Duration,
}

impl DiagnosticCapture {
    /// Assembles a capture pipeline from the configured probes.
    pub fn new(
        cfg: &SupervisorConfig,
        dump: Arc<dyn DumpProbe>,
        screenshot: Arc<dyn ScreenshotProbe>,
        resolver: Arc<dyn PidResolver>,
        runtime_home: Option<PathBuf>,
    ) -> Self {
        Self {
            dump,
            screenshot,
            resolver,
            runtime_home,
            low_memory_marker: cfg.low_memory_marker.clone(),
            resolve_attempts: cfg.pid_resolve_attempts,
            resolve_delay: cfg.pid_resolve_delay,
        }
    }

    /// Captures diagnostics before the process is killed.
    ///
    /// Sub-steps, each independently caught and logged:
    /// 1. screenshot into the run's screenshot directory (always attempted);
    /// 2. nothing further when the kill is expected;
    /// 3. thread dump to `threadDump-before-kill-<millis>.txt`;
    /// 4. memory dump to `memoryDump-before-kill-<millis>.hprof.gz`, only
    ///    when the low-memory marker is present in the log stream.
    pub async fn capture_on_kill(
        &self,
        ctx: &RunContext,
        process: &ProcessHandle,
        work_dir: &Path,
        expected_kill: bool,
    ) {
        let shots = ctx.screenshots_dir();
        if let Err(e) = std::fs::create_dir_all(&shots) {
            warn!(run = ctx.name(), "cannot create screenshot dir: {e}");
        } else if let Err(e) = self.screenshot.capture(&shots).await {
            warn!(run = ctx.name(), probe = self.screenshot.name(), "screenshot failed: {e}");
        }

        if expected_kill {
            return;
        }

        let pid = match self.resolve_pid(work_dir, process.pid()).await {
            Ok(pid) => pid,
            Err(e) => {
                warn!(run = ctx.name(), "pid resolution failed, using native pid: {e}");
                process.pid()
            }
        };

        let millis = epoch_millis();
        let dump_file = ctx.logs_dir().join(format!("threadDump-before-kill-{millis}.txt"));
        if let Err(e) = self.dump.thread_dump(pid, &dump_file).await {
            warn!(run = ctx.name(), probe = self.dump.name(), "thread dump failed: {e}");
        }

        if low_memory_signal_present(&ctx.log_file(), &self.low_memory_marker) {
            let memory_file = ctx
                .snapshots_dir()
                .join(format!("memoryDump-before-kill-{millis}.hprof.gz"));
            if let Err(e) = self.dump.memory_dump(pid, &memory_file).await {
                warn!(run = ctx.name(), probe = self.dump.name(), "memory dump failed: {e}");
            }
        } else {
            debug!(run = ctx.name(), "no low-memory signal, skipping memory dump");
        }
    }

    /// Resolves the manageable pid, retrying on a fixed interval; process
    /// ids may be unstable while the application is still starting up.
    pub(crate) async fn resolve_pid(
        &self,
        work_dir: &Path,
        native_pid: u32,
    ) -> Result<u32, ProbeError> {
        let attempts = self.resolve_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self
                .resolver
                .resolve(self.runtime_home.as_deref(), work_dir, native_pid)
                .await
            {
                Ok(pid) => return Ok(pid),
                Err(e) => {
                    debug!(
                        resolver = self.resolver.name(),
                        attempt, "pid resolution attempt failed: {e}"
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.resolve_delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProbeError::msg("pid resolver never ran")))
    }
}

/// Scans the run's log for the configured low-memory marker.
///
/// Missing or unreadable logs count as "no signal"; this gate must never
/// fail the capture path.
pub(crate) fn low_memory_signal_present(log_file: &Path, marker: &str) -> bool {
    let Ok(file) = std::fs::File::open(log_file) else {
        return false;
    };
    std::io::BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .any(|line| line.contains(marker))
}

pub(crate) fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn low_memory_gate_matches_marker_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        std::fs::write(&log, "starting\nLow memory signal received: afterGc=true\n").unwrap();
        assert!(low_memory_signal_present(&log, "Low memory signal received"));
        assert!(!low_memory_signal_present(&log, "Found one Java-level deadlock"));
    }

    #[test]
    fn low_memory_gate_tolerates_missing_log() {
        assert!(!low_memory_signal_present(
            Path::new("/definitely/not/here.log"),
            "marker"
        ));
    }

    struct FlakyResolver {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl PidResolver for FlakyResolver {
        async fn resolve(
            &self,
            _home: Option<&Path>,
            _work_dir: &Path,
            native_pid: u32,
        ) -> Result<u32, ProbeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                Ok(native_pid + 1000)
            } else {
                Err(ProbeError::msg("process table still settling"))
            }
        }
    }

    struct NoDumps;

    #[async_trait]
    impl DumpProbe for NoDumps {
        async fn thread_dump(&self, _pid: u32, _out: &Path) -> Result<(), ProbeError> {
            Ok(())
        }
        async fn memory_dump(&self, _pid: u32, _out: &Path) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pid_resolution_retries_until_success() {
        let cfg = SupervisorConfig {
            pid_resolve_attempts: 5,
            pid_resolve_delay: Duration::from_millis(1),
            ..SupervisorConfig::default()
        };
        let capture = DiagnosticCapture::new(
            &cfg,
            Arc::new(NoDumps),
            Arc::new(super::super::collab::NullScreenshotProbe),
            Arc::new(FlakyResolver {
                calls: AtomicU32::new(0),
                succeed_on: 3,
            }),
            None,
        );
        let pid = capture.resolve_pid(Path::new("/tmp"), 10).await.unwrap();
        assert_eq!(pid, 1010);
    }

    #[tokio::test]
    async fn pid_resolution_gives_up_after_attempts() {
        let cfg = SupervisorConfig {
            pid_resolve_attempts: 2,
            pid_resolve_delay: Duration::from_millis(1),
            ..SupervisorConfig::default()
        };
        let capture = DiagnosticCapture::new(
            &cfg,
            Arc::new(NoDumps),
            Arc::new(super::super::collab::NullScreenshotProbe),
            Arc::new(FlakyResolver {
                calls: AtomicU32::new(0),
                succeed_on: 10,
            }),
            None,
        );
        assert!(capture.resolve_pid(Path::new("/tmp"), 10).await.is_err());
    }
}
