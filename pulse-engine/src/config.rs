//! 引擎配置
//!
//! 所有配置均可由 serde 反序列化（时长以毫秒整数表示），缺省字段取默认值。
//!
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 事件引擎配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventEngineConfig {
    /// 处理循环的节拍间隔（约 60 次/秒）
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,
    /// 每个节拍最多出队并发处理的单元数
    pub max_concurrent_processing: usize,
    /// 分发队列容量，超出后丢弃新事件
    pub queue_capacity: usize,
    /// 历史容量，溢出时裁剪到一半
    pub history_capacity: usize,
    /// 重放时相邻事件之间的间隔
    #[serde(with = "duration_ms")]
    pub replay_interval: Duration,
    /// 单次处理器调用的默认超时（处理器自身配置优先）
    #[serde(with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub handler_timeout: Option<Duration>,
    pub debounce: DebounceConfig,
    pub throttle: ThrottleConfig,
    pub batch: BatchConfig,
}

impl Default for EventEngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            max_concurrent_processing: 10,
            queue_capacity: 10_000,
            history_capacity: 1_000,
            replay_interval: Duration::from_millis(1),
            handler_timeout: None,
            debounce: DebounceConfig::default(),
            throttle: ThrottleConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl EventEngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.tick_interval.is_zero() {
            return Err(EngineError::invalid_config("tick_interval must be positive"));
        }
        if self.max_concurrent_processing == 0 {
            return Err(EngineError::invalid_config(
                "max_concurrent_processing must be at least 1",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::invalid_config("queue_capacity must be at least 1"));
        }
        if self.history_capacity < 2 {
            return Err(EngineError::invalid_config("history_capacity must be at least 2"));
        }
        if self.batch.max_size == 0 {
            return Err(EngineError::invalid_config("batch.max_size must be at least 1"));
        }
        if !self.throttle.leading && !self.throttle.trailing {
            return Err(EngineError::invalid_config(
                "throttle needs at least one of leading/trailing",
            ));
        }
        Ok(())
    }
}

/// 防抖默认配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// 静默期
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    /// 新一轮突发的首个事件立即转发
    pub leading: bool,
    /// 突发持续时的最长等待，到期强制转发最新事件
    #[serde(with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub max_wait: Option<Duration>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(300),
            leading: false,
            max_wait: None,
        }
    }
}

/// 节流默认配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// 窗口开始时立即执行
    pub leading: bool,
    /// 窗口结束时执行窗口内最后一个事件
    pub trailing: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            leading: true,
            trailing: false,
        }
    }
}

/// 批处理默认配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 达到该数量立即刷新
    pub max_size: usize,
    /// 首个事件到达后的最长等待
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
    /// 分组字段（取自载荷），与事件类型共同组成批次键
    pub group_by: Vec<String>,
    /// 刷新前的排序字段（取自载荷，缺失或非数值时退回事件时间戳）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_wait: Duration::from_millis(100),
            group_by: Vec::new(),
            sort_by: Some("timestamp".to_string()),
        }
    }
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_engine_constants() {
        let cfg = EventEngineConfig::default();
        assert_eq!(cfg.tick_interval, Duration::from_millis(16));
        assert_eq!(cfg.max_concurrent_processing, 10);
        assert_eq!(cfg.queue_capacity, 10_000);
        assert_eq!(cfg.history_capacity, 1_000);
        assert_eq!(cfg.debounce.delay, Duration::from_millis(300));
        assert!(cfg.throttle.leading);
        assert!(!cfg.throttle.trailing);
        assert_eq!(cfg.batch.max_size, 50);
        assert_eq!(cfg.batch.sort_by.as_deref(), Some("timestamp"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EventEngineConfig = serde_json::from_str(
            r#"{"max_concurrent_processing": 4, "debounce": {"delay": 50}, "handler_timeout": 250}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_concurrent_processing, 4);
        assert_eq!(cfg.debounce.delay, Duration::from_millis(50));
        assert!(!cfg.debounce.leading);
        assert_eq!(cfg.handler_timeout, Some(Duration::from_millis(250)));
        assert_eq!(cfg.throttle, ThrottleConfig::default());
    }

    #[test]
    fn serializes_durations_as_millis() {
        let value = serde_json::to_value(EventEngineConfig::default()).unwrap();
        assert_eq!(value["tick_interval"], 16);
        assert_eq!(value["batch"]["max_wait"], 100);
        assert!(value.get("handler_timeout").is_none());
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut cfg = EventEngineConfig::default();
        cfg.max_concurrent_processing = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig { .. })));

        let mut cfg = EventEngineConfig::default();
        cfg.throttle.leading = false;
        cfg.throttle.trailing = false;
        assert!(cfg.validate().is_err());
    }
}
