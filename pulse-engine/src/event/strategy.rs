use crate::error::EngineError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// 事件投递策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStrategy {
    /// 立即处理（Immediate 优先级同步执行，其余入队）
    #[default]
    Immediate,
    /// 防抖：同一关联键只转发静默期后的最后一个事件
    Debounce,
    /// 节流：同一关联键每个间隔最多执行一次
    Throttle,
    /// 批处理：按键累积后整体投递
    Batch,
    /// 直接入队
    Queue,
    /// 合并：与队列中同键事件合并载荷
    Merge,
}

impl EventStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStrategy::Immediate => "immediate",
            EventStrategy::Debounce => "debounce",
            EventStrategy::Throttle => "throttle",
            EventStrategy::Batch => "batch",
            EventStrategy::Queue => "queue",
            EventStrategy::Merge => "merge",
        }
    }

    /// 宽松解析：未知或缺失的策略回退为 `Immediate` 并记录告警
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            None => EventStrategy::Immediate,
            Some(raw) => raw.parse().unwrap_or_else(|err: EngineError| {
                tracing::warn!(strategy = raw, error = %err, "falling back to immediate strategy");
                EventStrategy::Immediate
            }),
        }
    }
}

impl FromStr for EventStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(EventStrategy::Immediate),
            "debounce" => Ok(EventStrategy::Debounce),
            "throttle" => Ok(EventStrategy::Throttle),
            "batch" => Ok(EventStrategy::Batch),
            "queue" => Ok(EventStrategy::Queue),
            "merge" => Ok(EventStrategy::Merge),
            _ => Err(EngineError::StrategyMisconfiguration {
                value: s.to_string(),
            }),
        }
    }
}

// 外部协作方以 JSON 投递事件时，错误的策略值不应导致整个事件被拒绝
impl<'de> Deserialize<'de> for EventStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(EventStrategy::from_tag(raw.as_deref()))
    }
}

impl fmt::Display for EventStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
