//! 事件处理器（EventHandler）
//!
//! 定义消费某类/多类事件的处理逻辑与元信息（标识、订阅类型、优先级、重试配置）。
//!
use crate::error::EngineError;
use crate::event::{Event, EventPriority};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
}

impl HandledEventType {
    pub fn types(&self) -> Vec<&str> {
        match self {
            HandledEventType::One(t) => vec![t.as_str()],
            HandledEventType::Many(ts) => ts.iter().map(String::as_str).collect(),
        }
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            HandledEventType::One(t) => t == event_type,
            HandledEventType::Many(ts) => ts.iter().any(|t| t == event_type),
        }
    }
}

impl From<&str> for HandledEventType {
    fn from(value: &str) -> Self {
        HandledEventType::One(value.to_string())
    }
}

impl From<Vec<&str>> for HandledEventType {
    fn from(value: Vec<&str>) -> Self {
        HandledEventType::Many(value.into_iter().map(str::to_string).collect())
    }
}

/// 重试退避策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// 立即重试
    #[default]
    None,
    /// `retry_delay * n`
    Linear,
    /// `retry_delay * 2^(n-1)`
    Exponential,
}

impl RetryStrategy {
    /// 第 `attempt` 次重试（从 1 开始）之前的等待时间
    pub fn backoff(self, base: Duration, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Linear => base.saturating_mul(attempt.max(1)),
            RetryStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
                base.saturating_mul(factor)
            }
        }
    }
}

/// 处理器执行配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// 单次调用超时，缺省时使用引擎配置
    #[serde(
        with = "crate::config::option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    #[serde(with = "crate::config::duration_ms")]
    pub retry_delay: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: 0,
            retry_strategy: RetryStrategy::None,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// 事件处理器：处理某一类型的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器标识（注册表键，同时用于日志与失败记录）
    fn handler_id(&self) -> &str;
    /// 返回该处理器支持的事件类型
    fn handled_event_type(&self) -> HandledEventType;
    /// 仅处理这些分类的事件；`None` 表示不限
    fn categories(&self) -> Option<&[String]> {
        None
    }
    /// 同一事件的多个处理器按此升序执行
    fn priority(&self) -> EventPriority {
        EventPriority::Normal
    }
    fn config(&self) -> HandlerConfig {
        HandlerConfig::default()
    }
    fn can_handle(&self, _event: &Event) -> bool {
        true
    }
    /// 处理事件
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
    /// 批量处理；默认逐个调用 `handle`
    async fn handle_batch(&self, events: &[Event]) -> anyhow::Result<()> {
        for event in events {
            self.handle(event).await?;
        }
        Ok(())
    }
    fn on_register(&self) {}
    fn on_unregister(&self) {}
    fn on_error(&self, _error: &EngineError, _event: &Event) {}
}

type HandleFn = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// 以闭包实现的处理器
#[derive(Clone)]
pub struct FnHandler {
    id: String,
    event_type: HandledEventType,
    priority: EventPriority,
    categories: Option<Vec<String>>,
    config: HandlerConfig,
    f: HandleFn,
}

impl FnHandler {
    pub fn new<F, Fut>(id: impl Into<String>, event_type: impl Into<HandledEventType>, f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            priority: EventPriority::Normal,
            categories: None,
            config: HandlerConfig::default(),
            f: Arc::new(move |event| Box::pin(f(event))),
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .finish()
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    fn handler_id(&self) -> &str {
        &self.id
    }

    fn handled_event_type(&self) -> HandledEventType {
        self.event_type.clone()
    }

    fn categories(&self) -> Option<&[String]> {
        self.categories.as_deref()
    }

    fn priority(&self) -> EventPriority {
        self.priority
    }

    fn config(&self) -> HandlerConfig {
        self.config.clone()
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}
