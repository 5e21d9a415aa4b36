//! # Synchronous event bus: registration, dispatch, retained replay.
//!
//! This module groups the generic publish/subscribe machinery. It knows
//! nothing about process supervision; event identity is simply the concrete
//! Rust type published. The checkpoint payloads the supervisor publishes live
//! in [`crate::run`].
//!
//! ## Contents
//! - [`EventBus`]: typed topics, post-and-wait publish, retained-event slot
//! - [`Subscription`]: handle with cancellation and a hard join barrier
//!
//! ## Quick reference
//! - **Publisher**: [`ProcessSupervisor`](crate::run::ProcessSupervisor)
//!   at every lifecycle checkpoint.
//! - **Subscribers**: diagnostic capture, profilers, artifact publishers,
//!   and any external collaborator that registered a handler.

mod bus;
mod subscription;

pub use bus::EventBus;
pub use subscription::Subscription;
