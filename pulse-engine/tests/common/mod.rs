#![allow(dead_code)]

use async_trait::async_trait;
use pulse_engine::{Event, EventEngine, EventEngineConfig, EventHandler, HandledEventType};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // 每个测试二进制只初始化一次日志
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// 记录收到的事件与批次大小
pub struct Recorder {
    id: String,
    types: HandledEventType,
    pub seen: Mutex<Vec<Event>>,
    pub batches: Mutex<Vec<usize>>,
}

impl Recorder {
    pub fn new(id: &str, types: impl Into<HandledEventType>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            types: types.into(),
            seen: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }

    pub fn payload_values(&self, field: &str) -> Vec<serde_json::Value> {
        self.events()
            .iter()
            .map(|e| e.payload_field(field).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    fn handler_id(&self) -> &str {
        &self.id
    }

    fn handled_event_type(&self) -> HandledEventType {
        self.types.clone()
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn handle_batch(&self, events: &[Event]) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(events.len());
        self.seen.lock().unwrap().extend(events.iter().cloned());
        Ok(())
    }
}

pub fn engine(config: EventEngineConfig) -> Arc<EventEngine> {
    Arc::new(EventEngine::builder().config(config).build().unwrap())
}

pub fn fast_config() -> EventEngineConfig {
    EventEngineConfig {
        tick_interval: Duration::from_millis(5),
        ..EventEngineConfig::default()
    }
}

/// 条件轮询，超时返回 false
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            if cond() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
