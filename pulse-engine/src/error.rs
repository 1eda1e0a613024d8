//! 引擎统一错误定义
//!
//! 覆盖处理器执行、队列溢出、策略配置与运行时环境等最小必要集合。
//! 注意：`emit` 从不向调用方抛出错误，失败仅通过统计、日志与回调反馈；
//! 这里的类型主要用于处理器钩子、事件回调与配置校验。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    // --- 处理器 ---
    #[error("handler execution failed: handler={handler}, reason={reason}")]
    HandlerExecution { handler: String, reason: String },
    #[error("handler timed out: handler={handler}, timeout_ms={timeout_ms}")]
    HandlerTimeout { handler: String, timeout_ms: u64 },
    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    // --- 队列/策略 ---
    #[error("dispatch queue is full: capacity={capacity}")]
    QueueOverflow { capacity: usize },
    #[error("unknown event strategy: {value}")]
    StrategyMisconfiguration { value: String },

    // --- 配置/运行时 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("no tokio runtime available")]
    NoRuntime,

    // --- 序列化 ---
    #[error("serialization error: {reason}")]
    Serde { reason: String },
}

impl EngineError {
    pub fn handler_execution(handler: impl Into<String>, reason: impl ToString) -> Self {
        Self::HandlerExecution {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

// serde_json::Error 不可 Clone，这里仅保留错误描述
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serde {
            reason: err.to_string(),
        }
    }
}

/// 统一 Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
