//! # Launch configuration assembly.
//!
//! [`LaunchSpecBuilder`] accumulates direct mutations and an ordered list of
//! patch functions supplied by collaborators (profilers, diagnostics paths,
//! log directories). [`LaunchSpecBuilder::freeze`] applies the patches
//! strictly in registration order and returns the immutable [`LaunchSpec`].
//!
//! The assembler is deliberately dumb: all policy lives in the registering
//! collaborators; the builder only orders mutations and freezes the result.
//!
//! ## Rules
//! - Patches run in registration order, each seeing the effects of the ones
//!   before it.
//! - A patch that needs an unset prerequisite fails `freeze()` with a
//!   [`ConfigError`], so configuration problems never surface at spawn time.
//! - Once frozen, the configuration is immutable for the rest of the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// A configuration mutation registered by a collaborator.
pub type Patch = Box<dyn FnOnce(&mut LaunchSpecBuilder) -> Result<(), ConfigError> + Send>;

/// Immutable snapshot of everything needed to spawn the supervised process.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    executable: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    work_dir: PathBuf,
    run_timeout: Duration,
    expected_kill: bool,
    expected_exit_code: i32,
}

impl LaunchSpec {
    /// Path of the executable to spawn.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Argument list, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment variables added to the child's environment.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Working directory of the child process.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Upper bound on the whole run.
    pub fn run_timeout(&self) -> Duration {
        self.run_timeout
    }

    /// True when termination by the supervisor is planned, not a failure.
    pub fn expected_kill(&self) -> bool {
        self.expected_kill
    }

    /// Exit code that classifies an in-time exit as normal.
    pub fn expected_exit_code(&self) -> i32 {
        self.expected_exit_code
    }
}

/// Mutable builder for a [`LaunchSpec`], with an ordered patch list.
pub struct LaunchSpecBuilder {
    executable: Option<PathBuf>,
    args: Vec<String>,
    env: HashMap<String, String>,
    work_dir: Option<PathBuf>,
    run_timeout: Duration,
    expected_kill: bool,
    expected_exit_code: i32,
    patches: Vec<Patch>,
}

impl Default for LaunchSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchSpecBuilder {
    /// Creates an empty builder with a 10-minute run timeout.
    pub fn new() -> Self {
        Self {
            executable: None,
            args: Vec::new(),
            env: HashMap::new(),
            work_dir: None,
            run_timeout: Duration::from_secs(600),
            expected_kill: false,
            expected_exit_code: 0,
            patches: Vec::new(),
        }
    }

    /// Sets the executable to spawn.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory of the child.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Bounds the whole run; exceeding it triggers the kill path.
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Marks termination by the supervisor as planned: a timeout-triggered
    /// kill then produces a normal [`RunResult`](crate::run::RunResult)
    /// instead of a timeout error.
    pub fn expected_kill(mut self, expected: bool) -> Self {
        self.expected_kill = expected;
        self
    }

    /// Sets the exit code that classifies an in-time exit as normal.
    pub fn expected_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    /// Registers a configuration mutation to apply at freeze time.
    ///
    /// Patches are applied strictly in registration order. A patch that
    /// references an unset prerequisite should return a [`ConfigError`] so
    /// the run fails fast before any spawn is attempted.
    pub fn with_patch<F>(mut self, patch: F) -> Self
    where
        F: FnOnce(&mut LaunchSpecBuilder) -> Result<(), ConfigError> + Send + 'static,
    {
        self.patches.push(Box::new(patch));
        self
    }

    /// Registers an already boxed, ordered list of patches.
    pub fn with_patches(mut self, patches: impl IntoIterator<Item = Patch>) -> Self {
        self.patches.extend(patches);
        self
    }

    /// Current executable, for patches that need to inspect prerequisites.
    pub fn executable_path(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    /// Current working directory, for patches that need to inspect prerequisites.
    pub fn work_dir_path(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Current value of one environment variable.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Mutable access for patches that rewrite arguments in place.
    pub fn args_mut(&mut self) -> &mut Vec<String> {
        &mut self.args
    }

    /// In-place variant of [`env`](Self::env), for use inside patches.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// In-place variant of [`run_timeout`](Self::run_timeout), for patches.
    pub fn set_run_timeout(&mut self, timeout: Duration) {
        self.run_timeout = timeout;
    }

    /// Applies all registered patches in order and freezes the result.
    ///
    /// # Errors
    ///
    /// Returns the first patch failure, or a [`ConfigError`] when a required
    /// field (executable, working directory) is still unset afterwards.
    pub fn freeze(mut self) -> Result<LaunchSpec, ConfigError> {
        let patches = std::mem::take(&mut self.patches);
        for patch in patches {
            patch(&mut self)?;
        }

        let executable = self.executable.ok_or_else(|| ConfigError::MissingPrerequisite {
            what: "executable path".into(),
        })?;
        let work_dir = self.work_dir.ok_or_else(|| ConfigError::MissingPrerequisite {
            what: "working directory".into(),
        })?;
        if self.run_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "run_timeout",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(LaunchSpec {
            executable,
            args: self.args,
            env: self.env,
            work_dir,
            run_timeout: self.run_timeout,
            expected_kill: self.expected_kill,
            expected_exit_code: self.expected_exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LaunchSpecBuilder {
        LaunchSpecBuilder::new()
            .executable("/bin/true")
            .work_dir("/tmp")
    }

    #[test]
    fn patches_apply_in_registration_order() {
        let spec = base()
            .with_patch(|b| {
                b.set_env("ORDER", "first");
                Ok(())
            })
            .with_patch(|b| {
                assert_eq!(b.env_value("ORDER"), Some("first"));
                b.set_env("ORDER", "second");
                Ok(())
            })
            .freeze()
            .unwrap();
        assert_eq!(spec.env().get("ORDER").map(String::as_str), Some("second"));
    }

    #[test]
    fn patch_with_unset_prerequisite_fails_fast() {
        let err = LaunchSpecBuilder::new()
            .executable("/bin/true")
            .work_dir("/tmp")
            .with_patch(|b| match b.env_value("PROFILER_DIR") {
                Some(_) => Ok(()),
                None => Err(ConfigError::MissingPrerequisite {
                    what: "PROFILER_DIR for profiler injection".into(),
                }),
            })
            .freeze()
            .unwrap_err();
        assert_eq!(err.as_label(), "config_missing_prerequisite");
    }

    #[test]
    fn missing_executable_is_a_config_error() {
        let err = LaunchSpecBuilder::new().work_dir("/tmp").freeze().unwrap_err();
        assert!(err.to_string().contains("executable"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = base().run_timeout(Duration::ZERO).freeze().unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_value");
    }

    #[test]
    fn frozen_spec_keeps_builder_values() {
        let spec = base()
            .arg("-a")
            .args(["-b", "-c"])
            .env("K", "V")
            .run_timeout(Duration::from_secs(5))
            .expected_kill(true)
            .expected_exit_code(7)
            .freeze()
            .unwrap();
        assert_eq!(spec.args(), ["-a", "-b", "-c"]);
        assert_eq!(spec.env().get("K").map(String::as_str), Some("V"));
        assert!(spec.expected_kill());
        assert_eq!(spec.expected_exit_code(), 7);
    }
}
