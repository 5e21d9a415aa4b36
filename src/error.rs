//! Error types used by the runvisor runtime.
//!
//! This module defines the failure taxonomy of a supervised run:
//!
//! - [`ConfigError`]: launch configuration problems, raised before any spawn.
//! - [`HandlerError`]: a bus subscriber's handler failed.
//! - [`BusError`]: errors surfaced to a publisher by the event bus.
//! - [`ProbeError`]: a diagnostic probe or collaborator call failed
//!   (always swallowed and logged by the capture path).
//! - [`RunError`]: terminal errors of one supervised run.
//!
//! All enums provide `as_label()` for stable snake_case labels in logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors raised while assembling a launch configuration.
///
/// Configuration problems fail fast at [`freeze`](crate::run::LaunchSpecBuilder::freeze)
/// time, never at process-spawn time.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A mutation referenced a prerequisite that was never set.
    #[error("missing prerequisite: {what}")]
    MissingPrerequisite {
        /// What the mutation expected to find.
        what: String,
    },

    /// A field holds a value the runtime cannot work with.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::MissingPrerequisite { .. } => "config_missing_prerequisite",
            ConfigError::InvalidValue { .. } => "config_invalid_value",
        }
    }
}

/// # Failure of a single subscriber handler.
///
/// Produced inside handlers registered on the [`EventBus`](crate::EventBus).
/// The bus wraps it into [`BusError::HandlerFailed`] together with the
/// subscriber's name before surfacing it to the publisher.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable failure description.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from any displayable message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::msg(e.to_string())
    }
}

/// # Errors surfaced by the event bus to a publisher.
///
/// A failing handler never prevents delivery to its siblings; the first
/// failure is reported here only after every handler for the event finished.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// A subscriber handler returned an error (or panicked) during dispatch.
    #[error("subscriber '{subscriber}' failed: {source}")]
    HandlerFailed {
        /// Name the subscriber registered under.
        subscriber: String,
        /// The originating handler failure.
        #[source]
        source: HandlerError,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::HandlerFailed { .. } => "bus_handler_failed",
        }
    }
}

/// # Failure of a diagnostic probe or collaborator call.
///
/// Screenshot, thread-dump, memory-dump, and pid-resolution failures are
/// best-effort by contract: the capture path logs them and carries on.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ProbeError(pub String);

impl ProbeError {
    /// Creates a probe error from any displayable message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// # Terminal errors of one supervised run.
///
/// The caller of [`ProcessSupervisor::run`](crate::run::ProcessSupervisor::run)
/// receives either a [`RunResult`](crate::run::RunResult) or exactly one of
/// these, carrying the most specific diagnosis available.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// Launch configuration was rejected before spawn.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The process could not be spawned.
    #[error("failed to spawn '{executable}': {source}")]
    Spawn {
        /// Executable the supervisor tried to launch.
        executable: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its run timeout without the expected-kill flag.
    ///
    /// `diagnosis` carries the analyzer's findings (and any externally
    /// supplied failure-details link) when recognizable patterns were found.
    #[error("run timed out after {timeout:?}{}", fmt_detail(diagnosis))]
    Timeout {
        /// The configured run timeout that was exceeded.
        timeout: Duration,
        /// Optional structured diagnosis extracted from logs and dumps.
        diagnosis: Option<String>,
    },

    /// The process exited in time but with an unexpected exit code.
    #[error("process exited with code {code:?}, expected {expected}{}", fmt_detail(details))]
    Crashed {
        /// Observed exit code (`None` when terminated by a signal).
        code: Option<i32>,
        /// Exit code the run configuration expected.
        expected: i32,
        /// Optional externally supplied failure details.
        details: Option<String>,
    },

    /// A checkpoint subscriber failed; the run result cannot be trusted.
    #[error(transparent)]
    Checkpoint(#[from] BusError),

    /// A cleanup sub-step failed after a run that was otherwise successful.
    #[error("cleanup failed: {message}")]
    Cleanup {
        /// What went wrong during cleanup.
        message: String,
    },
}

impl RunError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Config(_) => "run_config",
            RunError::Spawn { .. } => "run_spawn",
            RunError::Timeout { .. } => "run_timeout",
            RunError::Crashed { .. } => "run_crashed",
            RunError::Checkpoint(_) => "run_checkpoint",
            RunError::Cleanup { .. } => "run_cleanup",
        }
    }
}

fn fmt_detail(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!("\n{d}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_without_diagnosis_is_single_line() {
        let err = RunError::Timeout {
            timeout: Duration::from_millis(100),
            diagnosis: None,
        };
        assert_eq!(err.to_string(), "run timed out after 100ms");
        assert_eq!(err.as_label(), "run_timeout");
    }

    #[test]
    fn timeout_display_appends_diagnosis() {
        let err = RunError::Timeout {
            timeout: Duration::from_secs(5),
            diagnosis: Some("deadlock detected in thread dump".into()),
        };
        let text = err.to_string();
        assert!(text.contains("run timed out after 5s"));
        assert!(text.contains("deadlock detected"));
    }

    #[test]
    fn handler_failure_keeps_subscriber_name() {
        let err = BusError::HandlerFailed {
            subscriber: "screenshot".into(),
            source: HandlerError::msg("display unavailable"),
        };
        assert!(err.to_string().contains("screenshot"));
        assert!(err.to_string().contains("display unavailable"));
    }
}
