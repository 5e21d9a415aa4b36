//! # Checkpoint events published by the process supervisor.
//!
//! Each milestone of a supervised run is a distinct event type; identity on
//! the [`EventBus`](crate::EventBus) is the concrete type. Payloads are
//! immutable values carrying the run context and, where relevant, a
//! [`ProcessHandle`], never the owned child handle, which stays with the
//! supervisor.
//!
//! ## Checkpoint order
//! ```text
//! BeforeLaunch ─► Launch ─► (run) ─► BeforeKill? ─► StopProfiler? ─► AfterLaunch
//!                              └─► ProcessException (external trigger, any time while alive)
//! ```
//! `AfterLaunch` fires on **every** exit path, carrying the success flag.

use super::context::RunContext;
use super::process::ProcessHandle;

/// Published before the launch configuration is used to spawn the process.
///
/// Collaborators use this checkpoint to finish preparations that must
/// precede the spawn (profiler agents, config injection).
#[derive(Clone, Debug)]
pub struct BeforeLaunchEvent {
    /// The run being launched.
    pub run: RunContext,
}

/// Published right after the process was spawned, before execution proceeds.
///
/// This is where diagnostic hooks attach their own watchers; the publisher
/// waits for all of them before the run continues.
#[derive(Clone, Debug)]
pub struct LaunchEvent {
    /// The run that owns the process.
    pub run: RunContext,
    /// Live process reference (pid + liveness flag).
    pub process: ProcessHandle,
}

/// Published before an abnormal termination signal is sent.
///
/// Forensic capture and profiler shutdown happen here; the kill signal is
/// sent only after every subscriber completed.
#[derive(Clone, Debug)]
pub struct BeforeKillEvent {
    /// The run being terminated.
    pub run: RunContext,
    /// The process about to be killed.
    pub process: ProcessHandle,
    /// Native pid of the process about to be killed.
    pub pid: u32,
}

/// Published from the guaranteed-execution cleanup path, on every exit path.
///
/// Collaborators assert invariants, collect final diagnostics, and publish
/// artifacts at this checkpoint.
#[derive(Clone, Debug)]
pub struct AfterLaunchEvent {
    /// The run that finished.
    pub run: RunContext,
    /// Whether the run completed without a primary failure.
    pub success: bool,
}

/// Published by external collaborators when an exception elsewhere requires
/// forensic capture while the process is still alive.
#[derive(Clone, Debug)]
pub struct ProcessExceptionEvent {
    /// The process to capture diagnostics from.
    pub process: ProcessHandle,
}

/// Published on the kill path when a profiler is configured; profiling
/// collaborators stop and flush their snapshots here.
#[derive(Clone, Debug)]
pub struct StopProfilerEvent;
