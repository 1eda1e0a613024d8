//! 标准事件模型（Event）
//!
//! 事件在 `emit` 时创建，处理完成前归引擎所有，之后以只读形态保留在历史中。
//!
use super::{CorrelationKey, EventCallbacks, EventPayload, EventPriority, EventStrategy};
use crate::config::option_duration_ms;
use crate::error::EngineResult;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// 未指定分类时的默认分类
pub const DEFAULT_CATEGORY: &str = "user";
/// 未指定关联 ID 时的默认值
pub const DEFAULT_CORRELATION_ID: &str = "default";

/// 重放事件在 metadata 中的标记字段
pub const META_IS_REPLAY: &str = "isReplay";
/// 重放事件在 metadata 中记录原事件 ID 的字段
pub const META_ORIGINAL_ID: &str = "originalId";

pub type EventId = String;

pub(crate) fn new_event_id() -> EventId {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct Event {
    /// 事件唯一标识符
    #[builder(default = new_event_id())]
    #[serde(default = "new_event_id")]
    id: EventId,
    /// 事件类型，处理器据此匹配
    #[serde(rename = "type")]
    event_type: String,
    /// 事件分类（user/system/data 等）
    #[builder(default = DEFAULT_CATEGORY.to_string())]
    #[serde(default = "default_category")]
    category: String,
    #[builder(default)]
    #[serde(default)]
    priority: EventPriority,
    #[builder(default)]
    #[serde(default)]
    strategy: EventStrategy,
    /// 事件时间戳，同优先级内按此排序
    #[builder(default = Utc::now())]
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    /// 生存时间：超过后不再分发
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    ttl: Option<Duration>,
    /// 延迟路由时间
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    delay: Option<Duration>,
    #[builder(default = Value::Object(Map::new()))]
    #[serde(default)]
    payload: Value,
    #[builder(default)]
    #[serde(default)]
    metadata: Map<String, Value>,

    // --- 策略参数（缺省时使用引擎配置） ---
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    debounce: Option<Duration>,
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    throttle: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    batch_timeout: Option<Duration>,

    // --- 关联信息 ---
    /// 关联 ID，与事件类型组成关联键
    #[builder(default = DEFAULT_CORRELATION_ID.to_string())]
    #[serde(default = "default_correlation_id")]
    correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,

    // --- 处理状态 ---
    #[builder(skip)]
    #[serde(default)]
    processed: bool,
    #[builder(skip)]
    #[serde(default)]
    retry_count: u32,
    /// 覆盖处理器配置的最大重试次数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,

    #[builder(default)]
    #[serde(skip)]
    callbacks: EventCallbacks,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_correlation_id() -> String {
    DEFAULT_CORRELATION_ID.to_string()
}

impl Event {
    /// 以类型与载荷创建事件，其余字段取默认值
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Event::builder()
            .event_type(event_type)
            .payload(payload)
            .build()
    }

    /// 从类型化载荷创建事件，类型与分类取自 `EventPayload`
    pub fn from_payload<P: EventPayload>(payload: &P) -> EngineResult<Self> {
        Ok(Event::builder()
            .event_type(P::EVENT_TYPE)
            .category(P::CATEGORY)
            .payload(serde_json::to_value(payload)?)
            .build())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn strategy(&self) -> EventStrategy {
        self.strategy
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce
    }

    pub fn throttle(&self) -> Option<Duration> {
        self.throttle
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn callbacks(&self) -> &EventCallbacks {
        &self.callbacks
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.event_type.clone(), self.correlation_id.clone())
    }

    pub fn is_replay(&self) -> bool {
        self.metadata
            .get(META_IS_REPLAY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 读取载荷中的顶层字段
    pub fn payload_field(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// 将载荷反序列化为类型化结构
    pub fn payload_as<P: DeserializeOwned>(&self) -> EngineResult<P> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// 是否已超过生存时间
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.signed_duration_since(self.timestamp);
                age.to_std().map(|age| age > ttl).unwrap_or(false)
            }
            None => false,
        }
    }

    /// 浅合并载荷：两侧均为对象时逐字段后写覆盖，否则整体替换
    pub(crate) fn merge_from(&mut self, newer: &Event) {
        match (&mut self.payload, &newer.payload) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k.clone(), v.clone());
                }
            }
            (slot, incoming) => *slot = incoming.clone(),
        }
        self.timestamp = newer.timestamp;
    }

    pub(crate) fn mark_processed(&mut self) -> bool {
        !std::mem::replace(&mut self.processed, true)
    }

    pub(crate) fn add_retries(&mut self, n: u32) {
        self.retry_count = self.retry_count.saturating_add(n);
    }

    /// 基于历史事件构造重放副本：新 ID、新时间戳、重置处理状态并打上重放标记
    pub(crate) fn to_replay(&self) -> Event {
        let mut replay = self.clone();
        replay.id = new_event_id();
        replay.timestamp = Utc::now();
        replay.processed = false;
        replay.retry_count = 0;
        replay
            .metadata
            .insert(META_IS_REPLAY.to_string(), Value::Bool(true));
        replay
            .metadata
            .insert(META_ORIGINAL_ID.to_string(), Value::String(self.id.clone()));
        replay
    }
}
