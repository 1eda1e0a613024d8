mod common;

use common::{Recorder, engine, fast_config, wait_until};
use pretty_assertions::assert_eq;
use pulse_engine::{
    EngineError, Event, EventCallbacks, EventEngineConfig, EventPriority, EventStrategy,
    FnHandler, HandlerConfig, RetryStrategy,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn failing_handler_does_not_stop_the_others() {
    let engine = engine(EventEngineConfig::default());
    let rec = Recorder::new("after", "save");
    engine.register_handler(Arc::new(
        FnHandler::new("broken", "save", |_| async {
            Err(anyhow::anyhow!("disk full"))
        })
        .with_priority(EventPriority::High),
    ));
    engine.register_handler(rec.clone());

    let errors = Arc::new(Mutex::new(Vec::<String>::new()));
    let successes = Arc::new(AtomicUsize::new(0));
    let completes = Arc::new(AtomicUsize::new(0));
    let callbacks = {
        let errors = errors.clone();
        let successes = successes.clone();
        let completes = completes.clone();
        EventCallbacks::new()
            .on_error(move |_, err| errors.lock().unwrap().push(err.to_string()))
            .on_success(move |_| {
                successes.fetch_add(1, Ordering::SeqCst);
            })
            .on_complete(move |_| {
                completes.fetch_add(1, Ordering::SeqCst);
            })
    };

    engine
        .emit(
            Event::builder()
                .event_type("save")
                .callbacks(callbacks)
                .build(),
        )
        .await;
    engine.flush().await;

    assert_eq!(rec.count(), 1);
    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("broken"));
    assert!(errors[0].contains("disk full"));
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(completes.load(Ordering::SeqCst), 1);

    let stats = engine.get_stats();
    assert_eq!(stats.failed_events, 1);
    assert_eq!(stats.processed_events, 1);
    assert_eq!(stats.event_type_stats["save"].errors, 1);
}

#[tokio::test]
async fn retries_until_success() {
    let engine = engine(EventEngineConfig::default());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    engine.register_handler(Arc::new(
        FnHandler::new("flaky", "sync", move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient");
                }
                Ok(())
            }
        })
        .with_config(HandlerConfig {
            max_retries: 3,
            retry_strategy: RetryStrategy::Linear,
            retry_delay: Duration::from_millis(1),
            ..HandlerConfig::default()
        }),
    ));

    let id = engine.emit_with("sync", json!({})).await;
    engine.flush().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = engine.get_stats();
    assert_eq!(stats.failed_events, 0);
    assert_eq!(stats.retried_invocations, 2);

    let history = engine.get_event_history(None);
    let stored = history.iter().find(|e| e.id() == id).unwrap();
    assert!(stored.is_processed());
    assert_eq!(stored.retry_count(), 2);
}

#[tokio::test]
async fn event_max_retries_overrides_handler_config() {
    let engine = engine(EventEngineConfig::default());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    engine.register_handler(Arc::new(
        FnHandler::new("always-fails", "job", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("nope")
            }
        })
        .with_config(HandlerConfig {
            max_retries: 5,
            ..HandlerConfig::default()
        }),
    ));

    engine
        .emit(Event::builder().event_type("job").max_retries(1).build())
        .await;
    engine.flush().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(engine.get_stats().failed_events, 1);
}

#[tokio::test]
async fn slow_handler_times_out() {
    let engine = engine(EventEngineConfig {
        handler_timeout: Some(Duration::from_millis(20)),
        ..EventEngineConfig::default()
    });
    engine.register_handler(Arc::new(FnHandler::new("slow", "work", |_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })));

    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    engine
        .emit(
            Event::builder()
                .event_type("work")
                .callbacks(EventCallbacks::new().on_error(move |_, err| {
                    *slot.lock().unwrap() = Some(err.clone());
                }))
                .build(),
        )
        .await;
    engine.flush().await;

    let err = seen.lock().unwrap().clone();
    assert!(matches!(
        err,
        Some(EngineError::HandlerTimeout { ref handler, timeout_ms: 20 }) if handler == "slow"
    ));
}

#[tokio::test]
async fn replay_reemits_history_as_new_events() {
    let engine = engine(EventEngineConfig::default());
    let rec = Recorder::new("rec", vec!["open", "close"]);
    engine.register_handler(rec.clone());

    engine.emit_with("open", json!({ "panel": 1 })).await;
    engine.emit_with("close", json!({ "panel": 1 })).await;
    engine.emit_with("open", json!({ "panel": 2 })).await;
    engine.flush().await;
    assert_eq!(rec.count(), 3);

    let originals: Vec<String> = engine
        .get_event_history(None)
        .iter()
        .filter(|e| e.event_type() == "open")
        .map(|e| e.id().to_string())
        .collect();

    let replayed = engine.replay_events(|e| e.event_type() == "open").await;
    assert_eq!(replayed, 2);
    engine.flush().await;

    let events = rec.events();
    assert_eq!(events.len(), 5);
    let replays: Vec<&Event> = events.iter().filter(|e| e.is_replay()).collect();
    assert_eq!(replays.len(), 2);
    for replay in &replays {
        let original = replay.metadata()["originalId"].as_str().unwrap();
        assert!(originals.iter().any(|id| id == original));
        assert_ne!(replay.id(), original);
    }
    assert_eq!(engine.get_stats().replayed_events, 2);
}

#[tokio::test]
async fn clear_performance_data_resets_counters() {
    let engine = engine(EventEngineConfig::default());
    engine.emit_with("x", json!({})).await;
    engine.flush().await;
    assert_eq!(engine.get_stats().total_events, 1);

    engine.clear_performance_data();
    let stats = engine.get_stats();
    assert_eq!(stats.total_events, 0);
    assert_eq!(stats.unhandled_events, 0);
    assert!(stats.event_type_stats.is_empty());
    // 历史不属于性能数据
    assert_eq!(stats.history_size, 1);
}

#[tokio::test]
async fn panicking_callback_does_not_stall_the_loop() {
    let engine = engine(fast_config());
    let rec = Recorder::new("rec", "job");
    engine.register_handler(rec.clone());
    let handle = engine.clone().start();

    engine
        .emit(
            Event::builder()
                .event_type("job")
                .callbacks(EventCallbacks::new().on_success(|_| panic!("callback exploded")))
                .build(),
        )
        .await;
    assert!(wait_until(Duration::from_secs(1), || rec.count() == 1).await);

    engine.emit_with("job", json!({ "n": 2 })).await;
    assert!(wait_until(Duration::from_secs(1), || rec.count() == 2).await);
    assert_eq!(engine.get_stats().queue_size, 0);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn panicking_callback_on_inline_event_stays_inside_emit() {
    let engine = engine(EventEngineConfig::default());
    let rec = Recorder::new("rec", "tap");
    engine.register_handler(rec.clone());

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();
    engine
        .emit(
            Event::builder()
                .event_type("tap")
                .strategy(EventStrategy::Immediate)
                .priority(EventPriority::Immediate)
                .callbacks(
                    EventCallbacks::new()
                        .on_success(|_| panic!("success exploded"))
                        .on_complete(move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }),
                )
                .build(),
        )
        .await;

    assert_eq!(rec.count(), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get_stats().processed_events, 1);
}
