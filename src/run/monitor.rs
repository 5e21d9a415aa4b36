//! # Liveness-monitoring thread-dump loop.
//!
//! While the supervised process is alive, a detached task captures one
//! thread dump per interval into the run's monitoring directory. The loop
//! stops on its own as soon as the process is observed dead, with no
//! external cancellation needed, and a single failed capture is logged and
//! never stops it.
//!
//! ```text
//! loop {
//!   alive? ──no──► exit
//!   sleep(interval)
//!   alive? ──no──► exit
//!   threadDump-<seq>-<timestamp>.txt   (failure → warn, continue)
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::collab::DumpProbe;
use super::context::RunContext;
use super::process::ProcessHandle;

/// Spawns the monitoring loop for `process`; returns the number of dumps
/// captured when the loop ends.
pub(crate) fn spawn(
    ctx: RunContext,
    process: ProcessHandle,
    pid: u32,
    probe: Arc<dyn DumpProbe>,
    interval: Duration,
    process_name: &str,
) -> JoinHandle<u64> {
    let dir = ctx.monitoring_dir(process_name);
    tokio::spawn(async move {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(run = ctx.name(), "cannot create monitoring dir: {e}");
            return 0;
        }

        let mut seq: u64 = 0;
        while process.is_alive() {
            tokio::time::sleep(interval).await;
            if !process.is_alive() {
                break;
            }

            seq += 1;
            let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
            let dump_file = dir.join(format!("threadDump-{seq}-{stamp}.txt"));
            debug!(run = ctx.name(), file = %dump_file.display(), "capturing monitoring thread dump");
            if let Err(e) = probe.thread_dump(pid, &dump_file).await {
                warn!(run = ctx.name(), seq, "monitoring thread dump failed: {e}");
            }
        }
        debug!(run = ctx.name(), dumps = seq, "monitoring loop finished");
        seq
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProbe {
        dumps: AtomicU32,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl DumpProbe for CountingProbe {
        async fn thread_dump(&self, _pid: u32, out: &Path) -> Result<(), ProbeError> {
            let n = self.dumps.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(ProbeError::msg("transient capture failure"));
            }
            std::fs::write(out, format!("dump {n}\n"))?;
            Ok(())
        }
        async fn memory_dump(&self, _pid: u32, _out: &Path) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn three_intervals_alive_produce_three_dumps_then_loop_ends() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "monitor").unwrap();
        let process = ProcessHandle::new(999);
        let probe = Arc::new(CountingProbe {
            dumps: AtomicU32::new(0),
            fail_on: None,
        });

        let handle = spawn(
            ctx.clone(),
            process.clone(),
            999,
            probe,
            Duration::from_millis(50),
            "app",
        );

        // Alive for ~3.5 intervals, then exit observed.
        tokio::time::sleep(Duration::from_millis(175)).await;
        process.mark_exited();

        let dumps = handle.await.unwrap();
        assert_eq!(dumps, 3, "one dump per completed interval while alive");

        let files = std::fs::read_dir(ctx.monitoring_dir("app"))
            .unwrap()
            .count();
        assert_eq!(files, 3, "no dump captured after exit was observed");
    }

    #[tokio::test]
    async fn single_capture_failure_does_not_stop_the_loop() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(root.path(), "monitor").unwrap();
        let process = ProcessHandle::new(999);
        let probe = Arc::new(CountingProbe {
            dumps: AtomicU32::new(0),
            fail_on: Some(1),
        });

        let handle = spawn(
            ctx.clone(),
            process.clone(),
            999,
            probe,
            Duration::from_millis(50),
            "app",
        );
        tokio::time::sleep(Duration::from_millis(125)).await;
        process.mark_exited();

        let dumps = handle.await.unwrap();
        assert_eq!(dumps, 2, "loop kept going past the failed capture");
        let files = std::fs::read_dir(ctx.monitoring_dir("app"))
            .unwrap()
            .count();
        assert_eq!(files, 1, "only the successful capture left a file");
    }
}
