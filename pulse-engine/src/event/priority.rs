use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件优先级
///
/// 数值越小越紧急；派生的 `Ord` 与数值顺序一致，队列据此排序。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// 系统关键事件，配合 Immediate 策略时在 `emit` 内同步执行
    Immediate = 0,
    /// 用户交互事件
    High = 1,
    /// 业务事件
    #[default]
    Normal = 2,
    /// 统计、日志事件
    Low = 3,
    /// 清理、维护事件
    Background = 4,
}

impl EventPriority {
    pub const ALL: [EventPriority; 5] = [
        EventPriority::Immediate,
        EventPriority::High,
        EventPriority::Normal,
        EventPriority::Low,
        EventPriority::Background,
    ];

    pub const fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventPriority::Immediate => "immediate",
            EventPriority::High => "high",
            EventPriority::Normal => "normal",
            EventPriority::Low => "low",
            EventPriority::Background => "background",
        }
    }
}

impl TryFrom<u8> for EventPriority {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        EventPriority::ALL
            .into_iter()
            .find(|p| p.level() == value)
            .ok_or(value)
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
