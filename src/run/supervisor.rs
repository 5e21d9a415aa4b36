//! # Process supervisor: launch, monitor, kill, clean up.
//!
//! [`ProcessSupervisor`] owns one run at a time: it assembles no policy of
//! its own, publishes every lifecycle checkpoint through the post-and-wait
//! [`EventBus`], and is the sole owner of the spawned child until
//! termination.
//!
//! ## Run lifecycle
//! ```text
//! Configuring ─► Launching ─► Running ─► ExitedNormally ─┐
//!                                      ─► Crashed        ├─► Cleanup ─► Done
//!                                      ─► TimedOut ──────┤
//!                                      ─► Killed ────────┘
//!
//! run(ctx, spec):
//!   ├─► publish BeforeLaunch          (post-and-wait)
//!   ├─► spawn process (own group, output → run.log)
//!   ├─► subscribe exception watcher   (forensic capture on demand)
//!   ├─► publish Launch                (post-and-wait; hooks attach here)
//!   ├─► resolve manageable pid        (retried; ids unstable at startup)
//!   ├─► spawn monitoring loop         (thread dump per interval)
//!   ├─► await exit, bounded by run_timeout
//!   │     ├─ in time, expected code   → ExitedNormally
//!   │     ├─ in time, other code      → Crashed
//!   │     └─ timeout → kill path:
//!   │           capture diagnostics → publish BeforeKill (post-and-wait)
//!   │           → publish StopProfiler? → SIGTERM, grace, SIGKILL
//!   │           → expected_kill ? Killed : TimedOut(+analyzer diagnosis)
//!   └─► cleanup (ALWAYS):
//!         publish AfterLaunch(success) (post-and-wait)
//!         publish artifacts            (failures logged, never mask)
//! ```
//!
//! ## Rules
//! - Exactly one `BeforeKill` publish per abnormal termination, and the kill
//!   signal is sent only after that checkpoint completes.
//! - `AfterLaunch` fires on every exit path; a cleanup failure is re-raised
//!   only after all cleanup sub-steps were attempted, and only when there is
//!   no primary failure to surface.
//! - Exactly one `RunResult` or error per run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::config::SupervisorConfig;
use crate::error::RunError;
use crate::events::EventBus;

use super::analyzer::TimeoutAnalyzer;
use super::collab::{
    ArtifactPublisher, DumpProbe, NativePidResolver, NullScreenshotProbe, PidResolver,
    ScreenshotProbe,
};
use super::context::RunContext;
use super::diagnostics::DiagnosticCapture;
use super::events::{
    AfterLaunchEvent, BeforeKillEvent, BeforeLaunchEvent, LaunchEvent, ProcessExceptionEvent,
    StopProfilerEvent,
};
use super::launch::LaunchSpec;
use super::monitor;
use super::process::SupervisedProcess;
use super::result::{ExitClass, RunResult};

/// Hook supplying an externally hosted failure-details link (CI artifacts,
/// report pages) appended to terminal errors.
pub type FailureDetails = Arc<dyn Fn(&RunContext) -> Option<String> + Send + Sync>;

/// Supervises the lifecycle of one external application process per run.
pub struct ProcessSupervisor {
    bus: EventBus,
    cfg: SupervisorConfig,
    dump: Arc<dyn DumpProbe>,
    screenshot: Arc<dyn ScreenshotProbe>,
    resolver: Arc<dyn PidResolver>,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    runtime_home: Option<PathBuf>,
    failure_details: Option<FailureDetails>,
}

impl ProcessSupervisor {
    /// Starts building a supervisor around `bus`.
    pub fn builder(bus: EventBus) -> SupervisorBuilder {
        SupervisorBuilder::new(bus)
    }

    /// The bus this supervisor publishes its checkpoints on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Runs the process described by `spec` to completion under supervision.
    ///
    /// Returns a [`RunResult`] on a normal exit or an expected kill; every
    /// other outcome raises a single [`RunError`] carrying the most specific
    /// diagnosis available. The cleanup checkpoint fires on all paths.
    pub async fn run(&self, ctx: RunContext, spec: LaunchSpec) -> Result<RunResult, RunError> {
        debug!(run = ctx.name(), state = "launching", timeout = ?spec.run_timeout(),
               exe = %spec.executable().display(), "starting supervised run");
        self.bus
            .publish(BeforeLaunchEvent { run: ctx.clone() })
            .await?;

        let primary = self.launch_and_wait(&ctx, &spec).await;
        let success = primary.is_ok();

        debug!(run = ctx.name(), state = "cleanup", success, "entering cleanup");
        let cleanup = self.cleanup(&ctx, success).await;
        debug!(run = ctx.name(), state = "done");

        match (primary, cleanup) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
            (Err(primary_err), Ok(())) => Err(primary_err),
            (Err(primary_err), Err(cleanup_err)) => {
                // The primary failure must never be masked by cleanup.
                error!(run = ctx.name(), secondary = %cleanup_err, "cleanup failed after run failure");
                Err(primary_err)
            }
        }
    }

    async fn launch_and_wait(
        &self,
        ctx: &RunContext,
        spec: &LaunchSpec,
    ) -> Result<RunResult, RunError> {
        let mut process = SupervisedProcess::spawn(spec, ctx)?;
        let started = Instant::now();

        let capture = Arc::new(DiagnosticCapture::new(
            &self.cfg,
            Arc::clone(&self.dump),
            Arc::clone(&self.screenshot),
            Arc::clone(&self.resolver),
            self.runtime_home.clone(),
        ));

        // The Exception checkpoint: collaborators elsewhere can request
        // forensic capture while the process is still alive. Registered
        // before Launch so it is in place the moment hooks start reacting.
        let watcher = {
            let capture = Arc::clone(&capture);
            let ctx = ctx.clone();
            let work_dir = spec.work_dir().to_path_buf();
            let expected_kill = spec.expected_kill();
            self.bus
                .subscribe_with::<ProcessExceptionEvent, _, _>(
                    "exception-capture",
                    true,
                    move |ev| {
                        let capture = Arc::clone(&capture);
                        let ctx = ctx.clone();
                        let work_dir = work_dir.clone();
                        async move {
                            if ev.process.is_alive() {
                                capture
                                    .capture_on_kill(&ctx, &ev.process, &work_dir, expected_kill)
                                    .await;
                            }
                            Ok(())
                        }
                    },
                )
                .await
        };

        let outcome = self
            .drive(ctx, spec, &mut process, &capture, started)
            .await;
        self.bus.unsubscribe(watcher).await;
        outcome
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        spec: &LaunchSpec,
        process: &mut SupervisedProcess,
        capture: &Arc<DiagnosticCapture>,
        started: Instant,
    ) -> Result<RunResult, RunError> {
        let handle = process.handle();
        if let Err(e) = self
            .bus
            .publish(LaunchEvent {
                run: ctx.clone(),
                process: handle.clone(),
            })
            .await
        {
            // A broken launch checkpoint is an abnormal termination like any
            // other: the process is live, so it goes through the kill path
            // (before-kill checkpoint, then group termination), not a drop.
            warn!(run = ctx.name(), "launch checkpoint failed, terminating: {e}");
            self.kill(ctx, spec, process, capture).await;
            return Err(e.into());
        }
        debug!(run = ctx.name(), state = "running", pid = handle.pid());

        let managed_pid = match capture.resolve_pid(spec.work_dir(), handle.pid()).await {
            Ok(pid) => pid,
            Err(e) => {
                warn!(run = ctx.name(), "pid resolution failed, monitoring native pid: {e}");
                handle.pid()
            }
        };
        // Detached on purpose: the loop observes process death on its own.
        let _monitoring = monitor::spawn(
            ctx.clone(),
            handle.clone(),
            managed_pid,
            Arc::clone(&self.dump),
            self.cfg.monitor_interval,
            "app",
        );

        match process.wait_with_timeout(spec.run_timeout()).await {
            Some(status) => {
                let elapsed = started.elapsed();
                let code = status.code();
                if code == Some(spec.expected_exit_code()) {
                    debug!(run = ctx.name(), state = "exited_normally", ?elapsed, "run completed");
                    Ok(RunResult {
                        run: ctx.clone(),
                        elapsed,
                        class: ExitClass::ExitedNormally,
                        exit_code: code,
                    })
                } else {
                    debug!(run = ctx.name(), state = "crashed", ?code);
                    Err(RunError::Crashed {
                        code,
                        expected: spec.expected_exit_code(),
                        details: self.failure_details(ctx),
                    })
                }
            }
            None => {
                self.kill(ctx, spec, process, capture).await;
                let elapsed = started.elapsed();
                if spec.expected_kill() {
                    debug!(run = ctx.name(), state = "killed", ?elapsed, "expected kill completed");
                    Ok(RunResult {
                        run: ctx.clone(),
                        elapsed,
                        class: ExitClass::Killed,
                        exit_code: None,
                    })
                } else {
                    debug!(run = ctx.name(), state = "timed_out");
                    Err(RunError::Timeout {
                        timeout: spec.run_timeout(),
                        diagnosis: self.timeout_diagnosis(ctx),
                    })
                }
            }
        }
    }

    /// The kill path: forensic capture, the before-kill checkpoint, profiler
    /// stop, then graceful-to-forced termination.
    async fn kill(
        &self,
        ctx: &RunContext,
        spec: &LaunchSpec,
        process: &mut SupervisedProcess,
        capture: &Arc<DiagnosticCapture>,
    ) {
        let handle = process.handle();
        debug!(run = ctx.name(), pid = handle.pid(), "entering kill path");

        capture
            .capture_on_kill(ctx, &handle, spec.work_dir(), spec.expected_kill())
            .await;

        if let Err(e) = self
            .bus
            .publish(BeforeKillEvent {
                run: ctx.clone(),
                process: handle.clone(),
                pid: handle.pid(),
            })
            .await
        {
            // The process still has to die; a broken checkpoint subscriber
            // cannot be allowed to leave it running.
            warn!(run = ctx.name(), "before-kill checkpoint failed: {e}");
        }

        if self.cfg.stop_profiler_on_kill {
            if let Err(e) = self.bus.publish(StopProfilerEvent).await {
                warn!(run = ctx.name(), "stop-profiler checkpoint failed: {e}");
            }
        }

        process.terminate(self.cfg.kill_grace).await;
    }

    /// Cleanup always runs all of its sub-steps; artifact publication is
    /// never skipped because an earlier step failed.
    async fn cleanup(&self, ctx: &RunContext, success: bool) -> Result<(), RunError> {
        let mut first: Option<RunError> = None;

        if let Err(e) = self
            .bus
            .publish(AfterLaunchEvent {
                run: ctx.clone(),
                success,
            })
            .await
        {
            error!(run = ctx.name(), "after-launch checkpoint failed: {e}");
            first.get_or_insert(RunError::Cleanup {
                message: e.to_string(),
            });
        }

        if let Some(publisher) = &self.publisher {
            match publisher.publish(ctx).await {
                Ok(()) => debug!(run = ctx.name(), publisher = publisher.name(), "artifacts published"),
                Err(e) => {
                    error!(run = ctx.name(), publisher = publisher.name(), "artifact publication failed: {e}");
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn timeout_diagnosis(&self, ctx: &RunContext) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(diagnosis) = TimeoutAnalyzer::analyze(ctx) {
            parts.push(diagnosis.render());
        }
        if let Some(details) = self.failure_details(ctx) {
            parts.push(details);
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    fn failure_details(&self, ctx: &RunContext) -> Option<String> {
        self.failure_details.as_ref().and_then(|f| f(ctx))
    }
}

/// Builder for a [`ProcessSupervisor`] with optional collaborator seams.
pub struct SupervisorBuilder {
    bus: EventBus,
    cfg: SupervisorConfig,
    dump: Option<Arc<dyn DumpProbe>>,
    screenshot: Arc<dyn ScreenshotProbe>,
    resolver: Arc<dyn PidResolver>,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    runtime_home: Option<PathBuf>,
    failure_details: Option<FailureDetails>,
}

impl SupervisorBuilder {
    fn new(bus: EventBus) -> Self {
        Self {
            bus,
            cfg: SupervisorConfig::default(),
            dump: None,
            screenshot: Arc::new(NullScreenshotProbe),
            resolver: Arc::new(NativePidResolver),
            publisher: None,
            runtime_home: None,
            failure_details: None,
        }
    }

    /// Overrides the global configuration.
    pub fn with_config(mut self, cfg: SupervisorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the thread/memory dump probe.
    pub fn with_dump_probe(mut self, probe: Arc<dyn DumpProbe>) -> Self {
        self.dump = Some(probe);
        self
    }

    /// Sets the screenshot probe (defaults to the headless no-op).
    pub fn with_screenshot_probe(mut self, probe: Arc<dyn ScreenshotProbe>) -> Self {
        self.screenshot = probe;
        self
    }

    /// Sets the collaborator pid resolver (defaults to the native pid).
    pub fn with_pid_resolver(mut self, resolver: Arc<dyn PidResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the artifact publisher invoked during cleanup.
    pub fn with_artifact_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Runtime installation handed to the pid resolver.
    pub fn with_runtime_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.runtime_home = Some(home.into());
        self
    }

    /// Hook producing an external failure-details link for terminal errors.
    pub fn with_failure_details(mut self, details: FailureDetails) -> Self {
        self.failure_details = Some(details);
        self
    }

    /// Builds the supervisor.
    pub fn build(self) -> ProcessSupervisor {
        ProcessSupervisor {
            bus: self.bus,
            cfg: self.cfg,
            dump: self
                .dump
                .unwrap_or_else(|| Arc::new(super::collab::UnconfiguredDumpProbe)),
            screenshot: self.screenshot,
            resolver: self.resolver,
            publisher: self.publisher,
            runtime_home: self.runtime_home,
            failure_details: self.failure_details,
        }
    }
}
