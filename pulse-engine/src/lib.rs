//! 优先级事件分发引擎（pulse-engine）
//!
//! 面向交互密集型应用的进程内事件系统：
//! - 事件模型（`event`）：标准事件、优先级、投递策略与类型化载荷；
//! - 分发子系统（`eventing`）：优先级队列、防抖/节流/批处理协调器、
//!   处理器注册表、统计与可重放历史，以及编排它们的 `EventEngine`；
//! - 配置（`config`）与统一错误（`error`）。
//!
//! 典型用法：
//! 1. 用 `EventEngine::builder()` 构建引擎并 `start()` 启动处理循环；
//! 2. 实现 `EventHandler`（或使用 `FnHandler`）并注册；
//! 3. 通过 `emit` / `emit_with` / `emit_typed` 发射事件，由事件策略决定投递方式；
//! 4. 通过 `get_stats` / `get_event_history` / `replay_events` 观察与重放。
//!
//! 引擎不做跨进程投递与持久化，事件只在当前进程内流转。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod eventing;

pub use config::{BatchConfig, DebounceConfig, EventEngineConfig, ThrottleConfig};
pub use error::{EngineError, EngineResult};
pub use event::{
    CorrelationKey, Event, EventCallbacks, EventId, EventPayload, EventPriority, EventStrategy,
};
pub use eventing::{
    EngineHandle, EventEngine, EventHandler, EventStats, FnHandler, HandledEventType,
    HandlerConfig, RetryStrategy, global_engine,
};

// 允许在本 crate 内部通过 ::pulse_engine 进行自引用，
// 以便过程宏生成的代码在本 crate 内同样能解析到 ::pulse_engine 路径。
extern crate self as pulse_engine;
