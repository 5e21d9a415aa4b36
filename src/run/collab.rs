//! # Collaborator seams.
//!
//! The supervisor consumes a handful of capabilities from the outside world
//! and stays ignorant of how they work: resolving the runtime-manageable pid
//! of the supervised process, writing thread/memory dumps, taking
//! screenshots, and publishing artifacts during cleanup. Each is a small
//! `async_trait` trait with a stock implementation; tests plug in fakes.
//!
//! All probe failures are [`ProbeError`]s; the capture path logs and
//! swallows them, never letting a diagnostic failure mask a run failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProbeError;

use super::context::RunContext;

/// Maps the spawned process to the pid a runtime-specific tool can manage.
///
/// For a JVM-style runtime the native pid of the launcher script differs
/// from the pid the dump tooling needs; the resolver bridges that gap. The
/// supervisor retries resolution, since process ids are unstable during
/// startup.
#[async_trait]
pub trait PidResolver: Send + Sync {
    /// Resolves the manageable pid for the process `native_pid`, spawned in
    /// `work_dir` under the runtime found at `runtime_home` (when known).
    async fn resolve(
        &self,
        runtime_home: Option<&Path>,
        work_dir: &Path,
        native_pid: u32,
    ) -> Result<u32, ProbeError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Resolver for runtimes whose native pid is already the manageable one.
pub struct NativePidResolver;

#[async_trait]
impl PidResolver for NativePidResolver {
    async fn resolve(
        &self,
        _runtime_home: Option<&Path>,
        _work_dir: &Path,
        native_pid: u32,
    ) -> Result<u32, ProbeError> {
        Ok(native_pid)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Writes thread and memory dumps of a live process.
#[async_trait]
pub trait DumpProbe: Send + Sync {
    /// Writes a thread dump of `pid` to `out`.
    async fn thread_dump(&self, pid: u32, out: &Path) -> Result<(), ProbeError>;

    /// Writes a memory dump of `pid` to `out`.
    async fn memory_dump(&self, pid: u32, out: &Path) -> Result<(), ProbeError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Dump probe that shells out to external tooling (a `jstack`/`jmap`
/// equivalent).
///
/// Argument templates may contain `{pid}` and `{out}` placeholders. When a
/// template has no `{out}`, the command's stdout is written to the output
/// file instead.
pub struct CommandDumpProbe {
    thread_program: String,
    thread_args: Vec<String>,
    memory_program: String,
    memory_args: Vec<String>,
}

impl CommandDumpProbe {
    /// Creates a probe from two command templates.
    pub fn new(
        thread_program: impl Into<String>,
        thread_args: Vec<String>,
        memory_program: impl Into<String>,
        memory_args: Vec<String>,
    ) -> Self {
        Self {
            thread_program: thread_program.into(),
            thread_args,
            memory_program: memory_program.into(),
            memory_args,
        }
    }

    async fn run(
        program: &str,
        template: &[String],
        pid: u32,
        out: &Path,
    ) -> Result<(), ProbeError> {
        let out_str = out.display().to_string();
        let pid_str = pid.to_string();
        let args: Vec<String> = template
            .iter()
            .map(|a| a.replace("{pid}", &pid_str).replace("{out}", &out_str))
            .collect();
        let captures_stdout = !template.iter().any(|a| a.contains("{out}"));

        let output = tokio::process::Command::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ProbeError::msg(format!("{program} failed to start: {e}")))?;
        if !output.status.success() {
            return Err(ProbeError::msg(format!(
                "{program} exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if captures_stdout {
            tokio::fs::write(out, &output.stdout).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DumpProbe for CommandDumpProbe {
    async fn thread_dump(&self, pid: u32, out: &Path) -> Result<(), ProbeError> {
        Self::run(&self.thread_program, &self.thread_args, pid, out).await
    }

    async fn memory_dump(&self, pid: u32, out: &Path) -> Result<(), ProbeError> {
        Self::run(&self.memory_program, &self.memory_args, pid, out).await
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Default probe when no dump tooling was wired in. Every capture fails
/// with a self-explanatory error, which the best-effort paths log and
/// continue past.
pub struct UnconfiguredDumpProbe;

#[async_trait]
impl DumpProbe for UnconfiguredDumpProbe {
    async fn thread_dump(&self, _pid: u32, _out: &Path) -> Result<(), ProbeError> {
        Err(ProbeError::msg("no dump probe configured"))
    }

    async fn memory_dump(&self, _pid: u32, _out: &Path) -> Result<(), ProbeError> {
        Err(ProbeError::msg("no dump probe configured"))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Takes a screenshot of the application under test.
#[async_trait]
pub trait ScreenshotProbe: Send + Sync {
    /// Writes screenshot artifacts into `out_dir`.
    async fn capture(&self, out_dir: &Path) -> Result<(), ProbeError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Screenshot probe for headless environments: does nothing, successfully.
pub struct NullScreenshotProbe;

#[async_trait]
impl ScreenshotProbe for NullScreenshotProbe {
    async fn capture(&self, out_dir: &Path) -> Result<(), ProbeError> {
        debug!(dir = %out_dir.display(), "screenshot capture skipped (headless)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Publishes run artifacts to an external sink during cleanup.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Publishes the artifacts of `run`. Invoked on every exit path.
    async fn publish(&self, run: &RunContext) -> Result<(), ProbeError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Publisher that copies the run's log and snapshot directories into a local
/// sink directory, keyed by run name.
pub struct DirArtifactPublisher {
    sink: PathBuf,
}

impl DirArtifactPublisher {
    /// Creates a publisher writing under `sink`.
    pub fn new(sink: impl Into<PathBuf>) -> Self {
        Self { sink: sink.into() }
    }
}

#[async_trait]
impl ArtifactPublisher for DirArtifactPublisher {
    async fn publish(&self, run: &RunContext) -> Result<(), ProbeError> {
        let dest = self.sink.join(run.name());
        copy_tree(run.logs_dir(), &dest.join("log"))?;
        copy_tree(run.snapshots_dir(), &dest.join("snapshots"))?;
        debug!(run = run.name(), dest = %dest.display(), "artifacts published");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dir"
    }
}

/// Recursive copy; artifact trees are small enough for a blocking walk.
fn copy_tree(src: &Path, dest: &Path) -> Result<(), ProbeError> {
    if !src.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn native_resolver_returns_native_pid() {
        let resolver = NativePidResolver;
        let pid = resolver
            .resolve(None, Path::new("/tmp"), 4242)
            .await
            .unwrap();
        assert_eq!(pid, 4242);
    }

    #[tokio::test]
    async fn dir_publisher_copies_log_tree() {
        let root = tempfile::tempdir().unwrap();
        let sink = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "pub").unwrap();
        std::fs::write(ctx.log_file(), "log line\n").unwrap();

        DirArtifactPublisher::new(sink.path())
            .publish(&ctx)
            .await
            .unwrap();
        let copied = sink.path().join("pub").join("log").join("run.log");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "log line\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_captures_stdout_when_template_has_no_out() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dump.txt");
        let probe = CommandDumpProbe::new(
            "echo",
            vec!["threads of {pid}".into()],
            "true",
            vec!["{pid}".into(), "{out}".into()],
        );
        probe.thread_dump(77, &out).await.unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().contains("threads of 77"));
    }
}
