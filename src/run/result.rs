//! # Run outcome types.
//!
//! [`RunResult`] is produced exactly once per run, on the success paths
//! (normal exit, or an expected kill). Abnormal outcomes surface as
//! [`RunError`](crate::RunError) instead; [`ExitClass`] names all four
//! terminal classifications either way.

use std::time::Duration;

use super::context::RunContext;

/// Terminal classification of a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// The process exited in time with the expected exit code.
    ExitedNormally,
    /// The process outlived its run timeout without the expected-kill flag.
    TimedOut,
    /// The supervisor killed the process as planned (`expected_kill`).
    Killed,
    /// The process exited in time but with an unexpected exit code.
    Crashed,
}

impl ExitClass {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitClass::ExitedNormally => "exited_normally",
            ExitClass::TimedOut => "timed_out",
            ExitClass::Killed => "killed",
            ExitClass::Crashed => "crashed",
        }
    }
}

/// Immutable outcome of one supervised run.
///
/// Artifact locations are reachable through [`RunResult::run`]: everything
/// a run produced lives under its run-scoped directories.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// The run this result belongs to.
    pub run: RunContext,
    /// Wall-clock time from spawn to observed termination.
    pub elapsed: Duration,
    /// Terminal classification.
    pub class: ExitClass,
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
}

impl RunResult {
    /// True when the process exited on its own with the expected code.
    pub fn exited_normally(&self) -> bool {
        self.class == ExitClass::ExitedNormally
    }
}
