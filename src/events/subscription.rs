//! # Subscription handle: cancellation plus join barrier.
//!
//! A [`Subscription`] is returned by [`EventBus::subscribe`](crate::EventBus::subscribe)
//! and owns everything the bus needs to stop the handler:
//! - a `CancellationToken` that gates *new* dispatches (a cancelled
//!   subscription is skipped by subsequent publishes);
//! - a `TaskTracker` holding every in-flight handler execution, so
//!   [`EventBus::unsubscribe`](crate::EventBus::unsubscribe) can wait for all
//!   of them before returning.
//!
//! ## Rules
//! - An execution that already started is **never** aborted mid-flight;
//!   unsubscribe waits for it instead. This is what makes unsubscribe a safe
//!   point to release resources the handler may still be using.
//! - Handles are single-use: unsubscribing consumes the handle.

use std::any::TypeId;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::error::HandlerError;

/// Type-erased event value shared between all handlers of one publish.
pub(crate) type ErasedEvent = Arc<dyn std::any::Any + Send + Sync>;

/// Type-erased handler: downcasts the event and runs the user callback.
pub(crate) type ErasedHandler =
    Arc<dyn Fn(ErasedEvent) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Bus-internal subscription record.
pub(crate) struct SubscriptionInner {
    /// Unique id within the owning bus.
    pub(crate) id: u64,
    /// Name the subscriber registered under (for logs and error messages).
    pub(crate) name: Arc<str>,
    /// Event type this subscription listens to.
    pub(crate) type_id: TypeId,
    /// The erased handler.
    pub(crate) handler: ErasedHandler,
    /// Tracks in-flight handler executions for the join barrier.
    pub(crate) tracker: TaskTracker,
    /// Gates new dispatches; cancelled on unsubscribe.
    pub(crate) token: CancellationToken,
}

/// Handle to an active subscription on an [`EventBus`](crate::EventBus).
///
/// Pass it back to [`EventBus::unsubscribe`](crate::EventBus::unsubscribe) to
/// cancel the subscription and wait for in-flight handler executions.
pub struct Subscription {
    pub(crate) inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Name the subscriber registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("type_id", &self.inner.type_id)
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}
