//! 事件子系统（eventing）
//!
//! 提供事件分发与处理的运行时：
//! - `DispatchQueue`：按优先级与时间戳排序的有界分发队列；
//! - `DebounceCoordinator` / `ThrottleCoordinator` / `BatchCoordinator`：按键延迟或重塑投递；
//! - `EventHandler`：对事件进行消费处理，`HandlerRegistry` 负责注册与查找；
//! - `EventEngine`：编排路由、定时器与有界并发处理，维护统计与可重放历史。
//!
pub mod batch;
pub mod debounce;
pub mod engine;
pub mod global;
pub mod handler;
pub mod history;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod throttle;
pub mod timer;

pub use batch::BatchCoordinator;
pub use debounce::DebounceCoordinator;
pub use engine::{EngineHandle, EventEngine};
pub use global::global_engine;
pub use handler::{EventHandler, FnHandler, HandledEventType, HandlerConfig, RetryStrategy};
pub use history::EventHistory;
pub use queue::DispatchQueue;
pub use registry::HandlerRegistry;
pub use stats::{EventStats, EventTypeStats, PerformanceStats, PriorityStats};
pub use throttle::{ThrottleCoordinator, ThrottleDecision};
pub use timer::DeadlineQueue;
