use anyhow::Result;
use pulse_engine::{
    BatchConfig, Event, EventEngine, EventEngineConfig, EventPriority, EventStrategy, FnHandler,
};
use pulse_macros::event_payload;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[event_payload(event_type = "filter.changed", category = "dashboard")]
struct FilterChanged {
    field: String,
    value: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("pulse_engine=debug"))
        .init();

    let engine = Arc::new(
        EventEngine::builder()
            .config(EventEngineConfig {
                tick_interval: Duration::from_millis(10),
                batch: BatchConfig {
                    max_size: 5,
                    max_wait: Duration::from_millis(200),
                    ..BatchConfig::default()
                },
                ..EventEngineConfig::default()
            })
            .build()?,
    );

    engine.register_handler(Arc::new(FnHandler::new("layout", "resize", |event| async move {
        println!("relayout: width={}", event.payload()["width"]);
        Ok(())
    })));
    engine.register_handler(Arc::new(FnHandler::new("scroll", "scroll", |event| async move {
        println!("scroll: offset={}", event.payload()["offset"]);
        Ok(())
    })));
    engine.register_handler(Arc::new(FnHandler::new("telemetry", "metric", |event| async move {
        println!("metric: {}", event.payload());
        Ok(())
    })));
    engine.register_handler(Arc::new(
        FnHandler::new("filters", "filter.changed", |event| async move {
            let change: FilterChanged = event.payload_as()?;
            println!("filter: {}={}", change.field, change.value);
            Ok(())
        })
        .with_priority(EventPriority::High),
    ));

    let handle = engine.clone().start();

    // 窗口拖拽产生的连续 resize 只触发一次重新布局
    for width in (800..=1200).step_by(100) {
        engine
            .emit(
                Event::builder()
                    .event_type("resize")
                    .strategy(EventStrategy::Debounce)
                    .debounce(Duration::from_millis(50))
                    .payload(json!({ "width": width }))
                    .build(),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for offset in 0..20 {
        engine
            .emit(
                Event::builder()
                    .event_type("scroll")
                    .strategy(EventStrategy::Throttle)
                    .throttle(Duration::from_millis(40))
                    .payload(json!({ "offset": offset * 10 }))
                    .build(),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for n in 0..12 {
        engine
            .emit(
                Event::builder()
                    .event_type("metric")
                    .strategy(EventStrategy::Batch)
                    .priority(EventPriority::Low)
                    .payload(json!({ "n": n }))
                    .build(),
            )
            .await;
    }

    engine
        .emit_typed(&FilterChanged {
            field: "region".to_string(),
            value: "emea".to_string(),
        })
        .await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.flush().await;

    let stats = engine.get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let replayed = engine
        .replay_events(|event| event.event_type() == "filter.changed")
        .await;
    engine.flush().await;
    println!("replayed {replayed} filter events");

    handle.shutdown();
    handle.join().await;
    Ok(())
}
