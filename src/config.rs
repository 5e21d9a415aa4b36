//! # Global supervisor configuration.
//!
//! Provides [`SupervisorConfig`], centralized settings for the process
//! supervisor runtime. Per-run settings (timeout, expected-kill flag,
//! command line) live in [`LaunchSpec`](crate::run::LaunchSpec) instead.
//!
//! ## Field semantics
//! - `monitor_interval`: delay between liveness thread dumps
//! - `kill_grace`: wait after graceful termination before force-killing
//! - `pid_resolve_attempts` / `pid_resolve_delay`: retry schedule for the
//!   collaborator pid resolver (process ids are unstable during startup)
//! - `low_memory_marker`: log line substring that gates memory-dump capture
//! - `stop_profiler_on_kill`: publish a profiler-stop checkpoint on the kill path

use std::time::Duration;

/// Global configuration for the supervisor runtime.
///
/// ## Notes
/// All fields are public for flexibility; defaults match the behavior of a
/// long-running application under integration test (minute-scale monitoring,
/// seconds-scale kill grace).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Interval between thread-dump captures in the liveness-monitoring loop.
    ///
    /// The loop stops on its own as soon as the process is no longer alive;
    /// a single failed capture is logged and never stops the loop.
    pub monitor_interval: Duration,

    /// Grace period between the graceful termination signal and the forced kill.
    pub kill_grace: Duration,

    /// How many times to retry the collaborator pid resolver before giving up
    /// and falling back to the native pid.
    pub pid_resolve_attempts: u32,

    /// Delay between pid-resolution retries.
    pub pid_resolve_delay: Duration,

    /// Log line substring whose presence enables memory-dump capture on kill.
    ///
    /// Capturing a memory dump unconditionally is prohibitively expensive;
    /// the heuristic trades completeness for cost.
    pub low_memory_marker: String,

    /// When `true`, the kill path publishes
    /// [`StopProfilerEvent`](crate::run::StopProfilerEvent) after the
    /// before-kill checkpoint completes.
    pub stop_profiler_on_kill: bool,
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `monitor_interval = 60s` (one thread dump per minute)
    /// - `kill_grace = 5s` (graceful exit window before SIGKILL)
    /// - `pid_resolve_attempts = 10`, `pid_resolve_delay = 1s`
    /// - `low_memory_marker = "Low memory signal received"`
    /// - `stop_profiler_on_kill = false`
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(60),
            kill_grace: Duration::from_secs(5),
            pid_resolve_attempts: 10,
            pid_resolve_delay: Duration::from_secs(1),
            low_memory_marker: "Low memory signal received".to_string(),
            stop_profiler_on_kill: false,
        }
    }
}
