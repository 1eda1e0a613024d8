use super::Event;
use crate::error::EngineError;
use std::{fmt, sync::Arc};

type SuccessFn = Arc<dyn Fn(&Event) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&Event, &EngineError) + Send + Sync>;
type CompleteFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// 单个事件的可选回调
///
/// - `on_success`：全部处理器执行完毕后触发；
/// - `on_error`：任一处理器失败时触发（每次失败一次）；
/// - `on_complete`：无论成功与否，事件离开处理流程时触发。
///
/// 回调以 `Arc` 持有，事件被克隆进历史或重放时共享同一组回调。
#[derive(Clone, Default)]
pub struct EventCallbacks {
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
}

impl EventCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&Event, &EngineError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_success.is_none() && self.on_error.is_none() && self.on_complete.is_none()
    }

    pub(crate) fn success(&self, event: &Event) {
        if let Some(f) = &self.on_success {
            f(event);
        }
    }

    pub(crate) fn error(&self, event: &Event, err: &EngineError) {
        if let Some(f) = &self.on_error {
            f(event, err);
        }
    }

    pub(crate) fn complete(&self, event: &Event) {
        if let Some(f) = &self.on_complete {
            f(event);
        }
    }
}

impl fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
