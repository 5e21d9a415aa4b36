//! # Supervised process runs.
//!
//! Everything one run needs, from configuration assembly to the final
//! [`RunResult`]:
//!
//! - [`RunContext`]: run identity and its artifact directory layout;
//! - [`LaunchSpec`]/[`LaunchSpecBuilder`]: immutable launch configuration,
//!   assembled by an ordered patch list and frozen before use;
//! - checkpoint event types ([`BeforeLaunchEvent`] through
//!   [`AfterLaunchEvent`]) published over the bus;
//! - [`ProcessHandle`]: pid and liveness without child ownership;
//! - collaborator seams ([`PidResolver`], [`DumpProbe`], [`ScreenshotProbe`],
//!   [`ArtifactPublisher`]);
//! - [`DiagnosticCapture`]: best-effort forensic capture before a kill;
//! - [`TimeoutAnalyzer`]: post-mortem diagnosis of timed-out runs;
//! - [`ProcessSupervisor`]: the orchestrator tying all of the above together.

mod analyzer;
mod collab;
mod context;
mod diagnostics;
mod events;
mod launch;
mod monitor;
mod process;
mod result;
mod supervisor;

pub use analyzer::{Diagnosis, TimeoutAnalyzer};
pub use collab::{
    ArtifactPublisher, CommandDumpProbe, DirArtifactPublisher, DumpProbe, NativePidResolver,
    NullScreenshotProbe, PidResolver, ScreenshotProbe, UnconfiguredDumpProbe,
};
pub use context::RunContext;
pub use diagnostics::DiagnosticCapture;
pub use events::{
    AfterLaunchEvent, BeforeKillEvent, BeforeLaunchEvent, LaunchEvent, ProcessExceptionEvent,
    StopProfilerEvent,
};
pub use launch::{LaunchSpec, LaunchSpecBuilder, Patch};
pub use process::ProcessHandle;
pub use result::{ExitClass, RunResult};
pub use supervisor::{FailureDetails, ProcessSupervisor, SupervisorBuilder};
