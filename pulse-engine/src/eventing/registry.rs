//! 处理器注册表（HandlerRegistry）
//!
//! 以处理器标识为键保存处理器，按事件类型查询时返回按优先级排序的处理器列表；
//! 同优先级按注册先后排列。
//!
use super::handler::EventHandler;
use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

struct Registered {
    handler: Arc<dyn EventHandler>,
    seq: u64,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Registered>,
    next_seq: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同一标识重复注册时替换旧处理器（旧处理器收到 `on_unregister`）
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        let id = handler.handler_id().to_string();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        handler.on_register();
        let previous = self.handlers.insert(
            id.clone(),
            Registered {
                handler: handler.clone(),
                seq,
            },
        );
        if let Some(old) = previous {
            warn!(handler = %id, "handler re-registered, replacing previous instance");
            old.handler.on_unregister();
        }

        info!(
            handler = %id,
            event_types = ?handler.handled_event_type().types(),
            "handler registered"
        );
    }

    pub fn unregister(&self, handler_id: &str) -> EngineResult<Arc<dyn EventHandler>> {
        match self.handlers.remove(handler_id) {
            Some((_, registered)) => {
                registered.handler.on_unregister();
                info!(handler = handler_id, "handler unregistered");
                Ok(registered.handler)
            }
            None => {
                warn!(handler = handler_id, "unregister: handler not found");
                Err(EngineError::HandlerNotFound(handler_id.to_string()))
            }
        }
    }

    /// 订阅某事件类型的处理器，按 (处理器优先级, 注册顺序) 排序
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut matched: Vec<(u8, u64, Arc<dyn EventHandler>)> = self
            .handlers
            .iter()
            .filter(|entry| entry.handler.handled_event_type().matches(event_type))
            .map(|entry| (entry.handler.priority().level(), entry.seq, entry.handler.clone()))
            .collect();
        matched.sort_by_key(|(level, seq, _)| (*level, *seq));
        matched.into_iter().map(|(_, _, h)| h).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 移除全部处理器，逐个触发 `on_unregister`
    pub fn clear(&self) {
        let ids: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, registered)) = self.handlers.remove(&id) {
                registered.handler.on_unregister();
            }
        }
    }
}
