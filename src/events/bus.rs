//! # Event bus with post-and-wait delivery.
//!
//! [`EventBus`] is an in-process publish/subscribe primitive whose defining
//! contract is synchronous: a publisher blocks until **every** interested
//! subscriber has finished reacting to an event before its own execution
//! continues. Lifecycle checkpoints use this to create a strict
//! happens-before edge between a checkpoint and the orchestration step that
//! follows it (diagnostic capture must fully complete *before* the process is
//! killed; artifact publication must complete *before* the run returns).
//!
//! ## Architecture
//! ```text
//! publish(E) ──► retained slot for E := event        (overwrite)
//!            ──► snapshot subscribers of E
//!            ──► spawn one task per handler ──► handler 1 ─┐
//!                                             handler 2 ─┼─ run concurrently
//!                                             handler N ─┘
//!            ──► await the whole set  ◄──────────────────┘
//!            ──► Err(first handler failure) | Ok(())
//! ```
//!
//! ## Rules
//! - **Post-and-wait**: `publish` returns only after all handlers invoked for
//!   the event reached completion (success or failure).
//! - **Isolation**: one failing (or panicking) handler never prevents
//!   delivery to sibling handlers; the first failure is surfaced to the
//!   publisher after all siblings finished.
//! - **Retained replay**: a late subscriber is invoked once, inside
//!   `subscribe`, with the most recently published value of its event type —
//!   unless it opts out with `skip_retained`. Replay failures have no
//!   publisher to inform; they are logged and dropped.
//! - **Unsubscribe barrier**: `unsubscribe` does not return while any
//!   previously dispatched handler execution for that subscription is still
//!   running. Started executions are never aborted mid-flight.
//! - **No persistence**: the retained slot holds at most one value per event
//!   type; there is no history, no topic hierarchy, no cross-process delivery.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::FutureExt;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::error::{BusError, HandlerError};

use super::subscription::{ErasedEvent, ErasedHandler, Subscription, SubscriptionInner};

/// Per-event-type registry entry.
#[derive(Default)]
struct Topic {
    /// Active subscriptions, in registration order.
    subs: Vec<Arc<SubscriptionInner>>,
    /// Most recently published value of this event type.
    retained: Option<ErasedEvent>,
}

struct BusInner {
    /// Event-type → topic. Guarded by a plain mutex; never held across await.
    topics: Mutex<HashMap<TypeId, Topic>>,
    next_id: AtomicU64,
}

/// In-process publish/subscribe bus with synchronous barrier semantics.
///
/// Cheap to clone; clones share the same subscriber registry and retained
/// slots. Each bus instance is independent; there is no process-wide
/// singleton.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Registers `handler` for events of type `E`.
    ///
    /// If a value of `E` was already published, the handler is invoked with
    /// it immediately (awaited inside this call) before any new publish of
    /// `E` can be observed. Use [`subscribe_with`](Self::subscribe_with) to
    /// opt out of the replay.
    pub async fn subscribe<E, F, Fut>(&self, name: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe_with::<E, F, Fut>(name, false, handler).await
    }

    /// Registers `handler` for events of type `E`, optionally skipping the
    /// retained-event replay.
    pub async fn subscribe_with<E, F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        skip_retained: bool,
        handler: F,
    ) -> Subscription
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let name: Arc<str> = name.into();
        let erased: ErasedHandler = Arc::new(move |ev: ErasedEvent| match ev.downcast::<E>() {
            Ok(ev) => handler(ev).boxed(),
            // Registry keys dispatches by TypeId, so this cannot happen;
            // treat a mismatch as a skipped delivery rather than a panic.
            Err(_) => std::future::ready(Ok(())).boxed(),
        });

        let inner = Arc::new(SubscriptionInner {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.clone(),
            type_id: TypeId::of::<E>(),
            handler: erased,
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        });

        let retained = {
            let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
            let topic = topics.entry(TypeId::of::<E>()).or_default();
            topic.subs.push(Arc::clone(&inner));
            if skip_retained {
                None
            } else {
                topic.retained.clone()
            }
        };

        if let Some(ev) = retained {
            debug!(subscriber = %name, "replaying retained event to late subscriber");
            let fut = (inner.handler)(ev);
            match inner.tracker.spawn(fut).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // No publisher is waiting on a replay; log and drop.
                    warn!(subscriber = %name, error = %e, "retained-event replay failed");
                }
                Err(join) => {
                    warn!(subscriber = %name, "retained-event replay panicked: {join}");
                }
            }
        }

        Subscription { inner }
    }

    /// Publishes `event` to every currently registered handler for its type
    /// and waits until all of them have completed.
    ///
    /// The retained slot for the event type is overwritten before dispatch,
    /// so a subscriber registering concurrently observes either this value
    /// via replay or the live dispatch, never neither.
    ///
    /// # Errors
    ///
    /// Returns the **first** handler failure (error or panic) after all
    /// handlers for this event finished. Sibling handlers always run to
    /// completion regardless of each other's outcome.
    pub async fn publish<E>(&self, event: E) -> Result<(), BusError>
    where
        E: Send + Sync + 'static,
    {
        let ev: ErasedEvent = Arc::new(event);

        // Spawning under the registry lock orders every dispatch before any
        // concurrent unsubscribe of the same subscription: once `retire` has
        // removed the entry and closed the tracker, no further execution can
        // slip past its join barrier. `TaskTracker::spawn` does not await.
        let dispatched = {
            let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
            let topic = topics.entry(TypeId::of::<E>()).or_default();
            topic.retained = Some(Arc::clone(&ev));

            let mut dispatched = Vec::with_capacity(topic.subs.len());
            for sub in &topic.subs {
                if sub.token.is_cancelled() {
                    continue;
                }
                let fut = (sub.handler)(Arc::clone(&ev));
                dispatched.push((Arc::clone(&sub.name), sub.tracker.spawn(fut)));
            }
            dispatched
        };

        let mut first_err: Option<BusError> = None;
        for (name, handle) in dispatched {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    warn!(subscriber = %name, error = %source, "handler failed");
                    first_err.get_or_insert(BusError::HandlerFailed {
                        subscriber: name.to_string(),
                        source,
                    });
                }
                Err(join) => {
                    warn!(subscriber = %name, "handler panicked: {join}");
                    first_err.get_or_insert(BusError::HandlerFailed {
                        subscriber: name.to_string(),
                        source: HandlerError::msg(format!("handler panicked: {join}")),
                    });
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancels `subscription` and waits for the termination of all in-flight
    /// handler executions before returning.
    ///
    /// After this call no publish will dispatch to the subscription, and no
    /// execution dispatched earlier is still running, so it is safe to
    /// release resources the handler used.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.retire(&subscription.inner).await;
    }

    /// Unsubscribes every active subscription, with the same join barrier as
    /// [`unsubscribe`](Self::unsubscribe). Retained values are kept.
    pub async fn unsubscribe_all(&self) {
        let all: Vec<Arc<SubscriptionInner>> = {
            let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.values_mut().flat_map(|t| t.subs.drain(..)).collect()
        };
        for sub in &all {
            sub.token.cancel();
        }
        for sub in all {
            sub.tracker.close();
            sub.tracker.wait().await;
        }
    }

    /// Number of active subscriptions for event type `E`.
    pub fn subscriber_count<E: 'static>(&self) -> usize {
        let topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .get(&TypeId::of::<E>())
            .map_or(0, |t| t.subs.iter().filter(|s| !s.token.is_cancelled()).count())
    }

    async fn retire(&self, inner: &Arc<SubscriptionInner>) {
        {
            let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(topic) = topics.get_mut(&inner.type_id) {
                topic.subs.retain(|s| s.id != inner.id);
            }
        }
        inner.token.cancel();
        inner.tracker.close();
        inner.tracker.wait().await;
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("EventBus")
            .field("topics", &topics.len())
            .finish()
    }
}
