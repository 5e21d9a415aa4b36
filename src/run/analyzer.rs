//! # Post-mortem timeout diagnosis.
//!
//! When a run times out, [`TimeoutAnalyzer`] inspects the log stream and the
//! before-kill thread dump for recognizable failure patterns and produces a
//! structured [`Diagnosis`]. The analysis is purely advisory: it never
//! changes control flow, only the quality of the error message the caller
//! receives. Without a match the supervisor falls back to the generic
//! "timed out after duration" message.

use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use super::context::RunContext;

/// Structured finding extracted from a timed-out run's artifacts.
#[derive(Clone, Debug)]
pub struct Diagnosis {
    /// Human-readable summary of the most likely cause.
    pub message: String,
    /// Extracted log/dump evidence backing the summary.
    pub evidence: String,
}

impl Diagnosis {
    /// Renders message and evidence as the multi-line text attached to the
    /// run's timeout error.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.message, self.evidence)
    }
}

/// Pattern-based analyzer over a run's logs and collected dumps.
pub struct TimeoutAnalyzer;

impl TimeoutAnalyzer {
    /// Returns a diagnosis when a recognizable pattern is found in the run's
    /// log file or its most recent before-kill thread dump.
    ///
    /// Recognized patterns, in priority order:
    /// 1. a deadlock report in the before-kill thread dump;
    /// 2. a low-memory signal in the log stream.
    pub fn analyze(ctx: &RunContext) -> Option<Diagnosis> {
        if let Some(evidence) = latest_before_kill_dump(ctx)
            .and_then(|dump| matching_lines(&dump, &["deadlock", "Deadlock"]))
        {
            debug!(run = ctx.name(), "deadlock pattern found in thread dump");
            return Some(Diagnosis {
                message: "the process appears deadlocked; see the before-kill thread dump".into(),
                evidence,
            });
        }

        if let Some(evidence) =
            matching_lines(&ctx.log_file(), &["Low memory signal received", "OutOfMemory"])
        {
            debug!(run = ctx.name(), "low-memory pattern found in log");
            return Some(Diagnosis {
                message: "the process ran low on memory before the timeout".into(),
                evidence,
            });
        }

        None
    }
}

/// Most recent `threadDump-before-kill-*.txt` in the run's log directory.
fn latest_before_kill_dump(ctx: &RunContext) -> Option<std::path::PathBuf> {
    let mut dumps: Vec<_> = std::fs::read_dir(ctx.logs_dir())
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("threadDump-before-kill-") && n.ends_with(".txt"))
        })
        .collect();
    dumps.sort();
    dumps.pop()
}

/// First few lines of `path` containing any of `needles`, or `None`.
fn matching_lines(path: &Path, needles: &[&str]) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let hits: Vec<String> = std::io::BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|line| needles.iter().any(|n| line.contains(n)))
        .take(5)
        .collect();
    if hits.is_empty() {
        None
    } else {
        Some(hits.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_in_dump_wins_over_log_patterns() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "analyze").unwrap();
        std::fs::write(ctx.log_file(), "Low memory signal received\n").unwrap();
        std::fs::write(
            ctx.logs_dir().join("threadDump-before-kill-123.txt"),
            "Found one Java-level deadlock:\n  waiting to lock monitor\n",
        )
        .unwrap();

        let d = TimeoutAnalyzer::analyze(&ctx).unwrap();
        assert!(d.message.contains("deadlocked"));
        assert!(d.evidence.contains("deadlock"));
    }

    #[test]
    fn low_memory_log_line_is_diagnosed() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "analyze").unwrap();
        std::fs::write(ctx.log_file(), "work\nLow memory signal received: afterGc=true\n").unwrap();

        let d = TimeoutAnalyzer::analyze(&ctx).unwrap();
        assert!(d.message.contains("low on memory"));
        assert!(d.render().contains("afterGc=true"));
    }

    #[test]
    fn unrecognizable_run_yields_no_diagnosis() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "analyze").unwrap();
        std::fs::write(ctx.log_file(), "all quiet\n").unwrap();
        assert!(TimeoutAnalyzer::analyze(&ctx).is_none());
    }
}
