//! 事件模型（Event）
//!
//! 定义标准事件、优先级、投递策略、关联键以及类型化载荷约定。

mod callbacks;
mod key;
mod model;
mod payload;
mod priority;
mod strategy;

pub use callbacks::EventCallbacks;
pub use key::CorrelationKey;
pub use model::{
    DEFAULT_CATEGORY, DEFAULT_CORRELATION_ID, Event, EventId, META_IS_REPLAY, META_ORIGINAL_ID,
};
pub use payload::EventPayload;
pub use priority::EventPriority;
pub use strategy::EventStrategy;
