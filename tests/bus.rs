//! Barrier semantics of the event bus, observed from the outside.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use runvisor::{EventBus, HandlerError};

#[derive(Clone, Debug)]
struct Ping(u32);

#[derive(Clone, Debug)]
struct Other;

#[tokio::test]
async fn publish_returns_only_after_every_handler_finished() {
    let bus = EventBus::new();
    let finished = Arc::new(AtomicU32::new(0));

    for delay_ms in [10u64, 40, 80] {
        let finished = Arc::clone(&finished);
        bus.subscribe::<Ping, _, _>(format!("sleeper-{delay_ms}"), move |_ev| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }

    let started = Instant::now();
    bus.publish(Ping(1)).await.unwrap();

    assert_eq!(
        finished.load(Ordering::SeqCst),
        3,
        "all handlers completed before publish returned"
    );
    assert!(
        started.elapsed() >= Duration::from_millis(80),
        "publish waited for the slowest handler"
    );
}

#[tokio::test]
async fn late_subscriber_replays_latest_retained_value_exactly_once() {
    let bus = EventBus::new();
    bus.publish(Ping(1)).await.unwrap();
    bus.publish(Ping(2)).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe::<Ping, _, _>("late", move |ev| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().await.push(ev.0);
                Ok(())
            }
        })
        .await;
    }

    // Replay happens inside subscribe; only the latest value is retained.
    assert_eq!(*seen.lock().await, vec![2]);

    bus.publish(Ping(3)).await.unwrap();
    assert_eq!(*seen.lock().await, vec![2, 3]);
}

#[tokio::test]
async fn skip_retained_suppresses_the_replay() {
    let bus = EventBus::new();
    bus.publish(Ping(7)).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe_with::<Ping, _, _>("fresh-only", true, move |ev| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().await.push(ev.0);
                Ok(())
            }
        })
        .await;
    }
    assert!(seen.lock().await.is_empty(), "no replay was delivered");

    bus.publish(Ping(8)).await.unwrap();
    assert_eq!(*seen.lock().await, vec![8]);
}

#[tokio::test]
async fn no_retained_value_means_no_replay() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));
    {
        let calls = Arc::clone(&calls);
        bus.subscribe::<Ping, _, _>("first", move |_ev| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsubscribe_waits_for_the_in_flight_handler() {
    let bus = EventBus::new();
    let finished = Arc::new(AtomicU32::new(0));

    let sub = {
        let finished = Arc::clone(&finished);
        bus.subscribe::<Ping, _, _>("slow", move |_ev| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
    };

    // Dispatch without waiting for completion, then immediately unsubscribe.
    let publisher = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.publish(Ping(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    bus.unsubscribe(sub).await;

    assert!(
        started.elapsed() >= Duration::from_millis(80),
        "unsubscribe blocked until the dispatched handler finished"
    );
    assert_eq!(
        finished.load(Ordering::SeqCst),
        1,
        "the handler ran to completion, never aborted mid-flight"
    );
    publisher.await.unwrap().unwrap();
    assert_eq!(bus.subscriber_count::<Ping>(), 0);
}

#[tokio::test]
async fn no_dispatch_after_unsubscribe_returns() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));

    let sub = {
        let calls = Arc::clone(&calls);
        bus.subscribe::<Ping, _, _>("counting", move |_ev| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
    };

    bus.publish(Ping(1)).await.unwrap();
    bus.unsubscribe(sub).await;
    bus.publish(Ping(2)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_handler_surfaces_to_publisher_after_siblings_ran() {
    let bus = EventBus::new();
    let sibling_ran = Arc::new(AtomicU32::new(0));

    bus.subscribe::<Ping, _, _>("faulty", |_ev| async {
        Err(HandlerError::msg("disk full"))
    })
    .await;
    {
        let sibling_ran = Arc::clone(&sibling_ran);
        bus.subscribe::<Ping, _, _>("sibling", move |_ev| {
            let sibling_ran = Arc::clone(&sibling_ran);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                sibling_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }

    let err = bus.publish(Ping(1)).await.unwrap_err();
    assert!(err.to_string().contains("faulty"));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(
        sibling_ran.load(Ordering::SeqCst),
        1,
        "the failure never blocked delivery to the sibling"
    );
}

#[tokio::test]
async fn panicking_handler_is_reported_and_isolated() {
    let bus = EventBus::new();
    let sibling_ran = Arc::new(AtomicU32::new(0));

    bus.subscribe::<Ping, _, _>("panicky", |_ev| async {
        panic!("handler exploded");
    })
    .await;
    {
        let sibling_ran = Arc::clone(&sibling_ran);
        bus.subscribe::<Ping, _, _>("sibling", move |_ev| {
            let sibling_ran = Arc::clone(&sibling_ran);
            async move {
                sibling_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }

    let err = bus.publish(Ping(1)).await.unwrap_err();
    assert!(err.to_string().contains("panicky"));
    assert_eq!(sibling_ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn event_types_are_independent_topics() {
    let bus = EventBus::new();
    let pings = Arc::new(AtomicU32::new(0));

    {
        let pings = Arc::clone(&pings);
        bus.subscribe::<Ping, _, _>("pings", move |_ev| {
            let pings = Arc::clone(&pings);
            async move {
                pings.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }

    bus.publish(Other).await.unwrap();
    assert_eq!(pings.load(Ordering::SeqCst), 0);
    assert_eq!(bus.subscriber_count::<Ping>(), 1);
    assert_eq!(bus.subscriber_count::<Other>(), 0);
}

#[tokio::test]
async fn unsubscribe_all_retires_every_subscription() {
    let bus = EventBus::new();
    bus.subscribe::<Ping, _, _>("a", |_ev| async { Ok(()) }).await;
    bus.subscribe::<Other, _, _>("b", |_ev| async { Ok(()) }).await;

    bus.unsubscribe_all().await;
    assert_eq!(bus.subscriber_count::<Ping>(), 0);
    assert_eq!(bus.subscriber_count::<Other>(), 0);

    // Retained values survive: a fresh subscriber still gets the replay.
    bus.publish(Ping(5)).await.unwrap();
    let seen = Arc::new(AtomicU32::new(0));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe::<Ping, _, _>("c", move |ev| {
            let seen = Arc::clone(&seen);
            async move {
                seen.store(ev.0, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    }
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}
