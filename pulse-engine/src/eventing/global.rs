//! 进程级默认引擎
//!
//! 首次在 tokio 运行时内访问时以默认配置构造并启动（循环已分离，直到 `destroy`）。
//! 循环运行在访问时所在的运行时上；该运行时关闭后，下一次在运行时内的访问会在
//! 当前运行时上重新启动循环，引擎状态与已注册处理器保持不变。
//!
use super::engine::{EngineHandle, EventEngine};
use crate::error::{EngineError, EngineResult};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::runtime::Handle;
use tracing::{info, warn};

static GLOBAL_ENGINE: OnceLock<Arc<EventEngine>> = OnceLock::new();
static GLOBAL_LOOP: Mutex<Option<EngineHandle>> = Mutex::new(None);

/// 获取进程级引擎
///
/// 在运行时外首次调用返回 `NoRuntime`；已初始化后在运行时外调用只返回引擎，
/// 不检查循环状态。
pub fn global_engine() -> EngineResult<Arc<EventEngine>> {
    let in_runtime = Handle::try_current().is_ok();

    let engine = match GLOBAL_ENGINE.get() {
        Some(engine) => engine.clone(),
        None if !in_runtime => return Err(EngineError::NoRuntime),
        None => {
            let candidate = Arc::new(EventEngine::builder().build()?);
            GLOBAL_ENGINE.get_or_init(|| candidate).clone()
        }
    };

    if in_runtime {
        ensure_loop(&engine);
    }
    Ok(engine)
}

fn ensure_loop(engine: &Arc<EventEngine>) {
    if engine.is_destroyed() {
        return;
    }

    let mut slot = GLOBAL_LOOP.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(handle) if !handle.is_finished() => return,
        Some(_) => warn!("global engine loop stopped with its runtime, restarting"),
        None => info!("global event engine initialized"),
    }
    *slot = Some(engine.clone().start().into_detached());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::handler::FnHandler;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::runtime::Builder;

    #[test]
    fn requires_a_runtime() {
        // 其他测试可能已在运行时内完成初始化
        match global_engine() {
            Ok(_) => assert!(GLOBAL_ENGINE.get().is_some()),
            Err(err) => assert!(matches!(err, EngineError::NoRuntime)),
        }
    }

    #[tokio::test]
    async fn returns_the_same_instance() {
        let a = global_engine().unwrap();
        let b = global_engine().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn loop_restarts_after_its_runtime_shuts_down() {
        let first = Builder::new_current_thread().enable_all().build().unwrap();
        let engine = first.block_on(async { global_engine().unwrap() });
        drop(first);

        let second = Builder::new_current_thread().enable_all().build().unwrap();
        second.block_on(async {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            engine.register_handler(Arc::new(FnHandler::new(
                "global-restart",
                "global.restart.ping",
                move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )));

            let again = global_engine().unwrap();
            assert!(Arc::ptr_eq(&engine, &again));
            again.emit_with("global.restart.ping", json!({})).await;

            let delivered = tokio::time::timeout(Duration::from_secs(2), async {
                while hits.load(Ordering::SeqCst) == 0 {
                    // 其他测试的运行时也可能持有过循环
                    global_engine().unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await;
            assert!(delivered.is_ok());
        });
    }
}
