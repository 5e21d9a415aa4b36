//! # runvisor: supervised external-process runs over a post-and-wait event bus.
//!
//! runvisor launches one external application process per run, watches it
//! for its whole lifetime, and turns whatever happens into exactly one
//! outcome: a [`RunResult`](run::RunResult) or a [`RunError`]. Every
//! lifecycle milestone is published as a typed checkpoint event on an
//! in-process [`EventBus`] whose publishers block until all subscribers have
//! finished reacting: the checkpoints are barriers, not notifications.
//!
//! ## Architecture
//!
//! ```text
//!                         ┌─────────────────────────────┐
//!     Patch, Patch, …  ──►│ LaunchSpecBuilder ► freeze  │──► LaunchSpec
//!                         └─────────────────────────────┘
//!                                        │
//!                                        ▼
//!   ┌──────────────────────── ProcessSupervisor ────────────────────────┐
//!   │  BeforeLaunch ► spawn ► Launch ► monitor loop ► wait w/ timeout   │
//!   │        │                                 │                        │
//!   │        │             timeout ► capture ► BeforeKill ► terminate   │
//!   │        └──────────────► AfterLaunch (every exit path) ◄───────────┘
//!   └────────────────────────────────┬───────────────────────────────────┘
//!                                    │ post-and-wait
//!                                    ▼
//!                ┌──────────────── EventBus ────────────────┐
//!                │ subscriber 1 │ subscriber 2 │ … │ sub N  │
//!                └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`events`]: the type-keyed publish/subscribe bus with retained-event
//!   replay and the unsubscribe join barrier;
//! - [`run`]: launch configuration, process ownership, liveness monitoring,
//!   forensic capture, timeout analysis, and the supervisor itself.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use runvisor::{EventBus, SupervisorConfig};
//! use runvisor::run::{LaunchSpecBuilder, ProcessSupervisor, RunContext};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::new();
//! let supervisor = ProcessSupervisor::builder(bus.clone())
//!     .with_config(SupervisorConfig::default())
//!     .build();
//!
//! let spec = LaunchSpecBuilder::new()
//!     .executable("/usr/bin/app")
//!     .work_dir("/tmp/app")
//!     .run_timeout(Duration::from_secs(300))
//!     .with_patch(|b| {
//!         b.set_env("APP_HEADLESS", "true");
//!         Ok(())
//!     })
//!     .freeze()?;
//!
//! let ctx = RunContext::create("/tmp/runs", "smoke")?;
//! let result = supervisor.run(ctx, spec).await?;
//! println!("finished: {}", result.class.as_label());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;

pub mod events;
pub mod run;

pub use config::SupervisorConfig;
pub use error::{BusError, ConfigError, HandlerError, ProbeError, RunError};
pub use events::{EventBus, Subscription};
