use std::fmt;

/// 关联键：`(事件类型, correlation_id)`
///
/// 防抖、节流与合并均以此为分组依据。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey {
    event_type: String,
    correlation_id: String,
}

impl CorrelationKey {
    pub fn new(event_type: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.event_type, self.correlation_id)
    }
}
