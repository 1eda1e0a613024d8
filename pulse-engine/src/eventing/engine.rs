//! 事件引擎（EventEngine）
//!
//! 统一编排“发射 → 策略路由 → 分发处理”：
//! - `emit` 记录统计与历史，并按事件策略交给防抖/节流/批处理协调器或直接入队；
//! - 长驻循环以固定节拍触发到期定时器，并从队列取出至多 `max_concurrent_processing`
//!   个处理单元并发执行；
//! - 处理器按优先级依次调用，逐个隔离失败（错误、panic、超时）并按配置重试；
//! - 提供关闭与等待的 `EngineHandle`。
//!
use super::batch::BatchCoordinator;
use super::debounce::DebounceCoordinator;
use super::handler::EventHandler;
use super::history::EventHistory;
use super::queue::DispatchQueue;
use super::registry::HandlerRegistry;
use super::stats::{EventStats, Gauges};
use super::throttle::{ThrottleCoordinator, ThrottleDecision};
use super::timer::DeadlineQueue;
use crate::config::EventEngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{Event, EventId, EventPayload, EventPriority, EventStrategy};
use bon::bon;
use chrono::Utc;
use futures_util::{FutureExt, StreamExt, stream};
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 一次出队的处理单元
enum Work {
    Single(Event),
    Batch(Vec<Event>),
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Single(&'a Event),
    Batch(&'a [Event]),
}

/// 受互斥锁保护的引擎状态；锁从不跨越 `.await` 持有
#[derive(Debug)]
struct EngineState {
    queue: DispatchQueue,
    ready_batches: VecDeque<Vec<Event>>,
    debounce: DebounceCoordinator,
    throttle: ThrottleCoordinator,
    batch: BatchCoordinator,
    delayed: DeadlineQueue<EventId>,
    delayed_events: HashMap<EventId, Event>,
    stats: EventStats,
    history: EventHistory,
}

impl EngineState {
    fn new(config: &EventEngineConfig) -> Self {
        Self {
            queue: DispatchQueue::new(config.queue_capacity),
            ready_batches: VecDeque::new(),
            debounce: DebounceCoordinator::new(),
            throttle: ThrottleCoordinator::new(),
            batch: BatchCoordinator::new(),
            delayed: DeadlineQueue::new(),
            delayed_events: HashMap::new(),
            stats: EventStats::default(),
            history: EventHistory::new(config.history_capacity),
        }
    }

    fn enqueue(&mut self, event: Event) {
        if !self.queue.enqueue(event) {
            self.stats.dropped_events += 1;
        }
    }

    fn push_batch(&mut self, batch: Vec<Event>, config: &EventEngineConfig) {
        debug!(size = batch.len(), "batch ready");
        self.stats.record_batch(batch.len(), config.batch.max_size);
        self.ready_batches.push_back(batch);
    }

    fn hold_delayed(&mut self, event: Event, deadline: Instant) {
        let id = event.id().to_string();
        self.delayed.schedule(id.clone(), deadline);
        self.delayed_events.insert(id, event);
    }

    /// 按策略路由；返回需要由调用方立即执行的事件
    fn route(&mut self, config: &EventEngineConfig, event: Event, now: Instant) -> Option<Event> {
        match event.strategy() {
            EventStrategy::Immediate => {
                if event.priority() == EventPriority::Immediate {
                    return Some(event);
                }
                self.enqueue(event);
            }
            EventStrategy::Debounce => {
                if let Some(leading) = self.debounce.debounce(event, &config.debounce, now) {
                    self.enqueue(leading);
                }
            }
            EventStrategy::Throttle => {
                // 先释放已到期的尾随事件，窗口判定基于最新状态
                for trailing in self.throttle.poll_expired(now) {
                    self.enqueue(trailing);
                }
                match self.throttle.throttle(event, &config.throttle, now) {
                    ThrottleDecision::Execute(event) => self.enqueue(event),
                    ThrottleDecision::Deferred | ThrottleDecision::Dropped => {}
                }
            }
            EventStrategy::Batch => {
                if let Some(batch) = self.batch.add(event, &config.batch, now) {
                    self.push_batch(batch, config);
                }
            }
            EventStrategy::Queue => self.enqueue(event),
            EventStrategy::Merge => match self.queue.merge_into(&event) {
                Some(target) => {
                    self.stats.merged_events += 1;
                    debug!(event_id = event.id(), merged_into = %target, "event merged");
                }
                None => self.enqueue(event),
            },
        }
        None
    }

    /// 触发所有到期定时器（暂停期间同样执行，转发的事件在队列中等待）
    fn fire_timers(&mut self, config: &EventEngineConfig, now: Instant) {
        for id in self.delayed.pop_expired(now) {
            if let Some(event) = self.delayed_events.remove(&id)
                && let Some(inline) = self.route(config, event, now)
            {
                self.enqueue(inline);
            }
        }
        for event in self.debounce.poll_expired(now) {
            self.enqueue(event);
        }
        for event in self.throttle.poll_expired(now) {
            self.enqueue(event);
        }
        for batch in self.batch.poll_expired(&config.batch, now) {
            self.push_batch(batch, config);
        }
    }

    fn flush_coordinators(&mut self, config: &EventEngineConfig) {
        for event in self.debounce.flush() {
            self.enqueue(event);
        }
        for batch in self.batch.flush_all(&config.batch) {
            self.push_batch(batch, config);
        }
    }

    /// 取出至多 `max` 个处理单元：先交付已就绪的批次，再按优先级取队列事件
    fn take_work(&mut self, max: usize) -> Vec<Work> {
        let mut work = Vec::new();
        while work.len() < max {
            match self.ready_batches.pop_front() {
                Some(batch) => work.push(Work::Batch(batch)),
                None => break,
            }
        }
        let remaining = max - work.len();
        work.extend(
            self.queue
                .dequeue_batch(remaining, None::<fn(&Event) -> bool>)
                .into_iter()
                .map(Work::Single),
        );
        work
    }

    fn gauges(&self) -> Gauges {
        Gauges {
            queue_size: self.queue.len(),
            pending_debounce: self.debounce.pending_count(),
            pending_throttle: self.throttle.pending_count(),
            pending_batches: self.batch.pending_count() + self.ready_batches.len(),
            history_size: self.history.len(),
            debounce_superseded: self.debounce.superseded(),
            debounce_forwarded: self.debounce.forwarded(),
            throttle_suppressed: self.throttle.throttled(),
            throttle_executed: self.throttle.executed(),
        }
    }

    fn clear_pending(&mut self) {
        self.debounce.clear();
        self.throttle.clear();
        self.batch.clear();
        self.delayed.clear();
        self.delayed_events.clear();
        self.queue.clear();
        self.ready_batches.clear();
    }
}

/// EventEngine：
/// - `emit` 按策略路由事件，队列/协调器状态集中在一把短临界区的锁内
/// - 处理循环周期性触发定时器并有界并发地分发处理单元
pub struct EventEngine {
    config: EventEngineConfig,
    registry: HandlerRegistry,
    state: Mutex<EngineState>,
    paused: AtomicBool,
    /// 当前是否有一轮分发在执行
    processing: AtomicBool,
    token: CancellationToken,
}

#[bon]
impl EventEngine {
    #[builder]
    pub fn new(
        #[builder(default)] config: EventEngineConfig,
        #[builder(default)] event_handlers: Vec<Arc<dyn EventHandler>>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let registry = HandlerRegistry::new();
        for handler in event_handlers {
            registry.register(handler);
        }

        Ok(Self {
            state: Mutex::new(EngineState::new(&config)),
            config,
            registry,
            paused: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            token: CancellationToken::new(),
        })
    }
}

impl EventEngine {
    /// 启动处理循环，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> EngineHandle {
        let token = self.token.clone();
        let interval = self.config.tick_interval;
        info!(tick_ms = interval.as_millis() as u64, "event engine started");

        let engine = self.clone();
        let task = Self::spawn_periodic(token.clone(), interval, move || {
            let engine = engine.clone();
            async move { engine.tick() }
        });

        EngineHandle {
            token: Some(token),
            tasks: vec![task],
        }
    }

    fn spawn_periodic<F, Fut>(
        token: CancellationToken,
        interval: Duration,
        mut f: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }

    fn tick(self: &Arc<Self>) {
        let work = {
            let mut state = self.state();
            state.fire_timers(&self.config, Instant::now());

            if self.paused.load(Ordering::Acquire) {
                return;
            }
            // 上一轮尚未结束时跳过本轮
            if self.processing.swap(true, Ordering::AcqRel) {
                return;
            }
            state.take_work(self.config.max_concurrent_processing)
        };

        if work.is_empty() {
            self.processing.store(false, Ordering::Release);
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _idle = ResetOnDrop(&engine.processing);
            engine.dispatch(work).await;
        });
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EventEngineConfig {
        &self.config
    }

    // --- 发射 ---

    /// 发射事件，返回事件 ID
    ///
    /// 不向调用方返回错误：丢弃、失败等情况通过统计、日志与回调反馈。
    /// `Immediate` 策略且 `Immediate` 优先级的事件在返回前执行完全部处理器。
    pub async fn emit(&self, event: Event) -> EventId {
        let id = event.id().to_string();
        debug!(
            event_id = %id,
            event_type = event.event_type(),
            strategy = %event.strategy(),
            priority = %event.priority(),
            "emit"
        );

        let inline = {
            let mut state = self.state();
            state.stats.record_emitted(&event);
            state.history.push(event.clone());

            let now = Instant::now();
            match event.delay().filter(|d| !d.is_zero()) {
                Some(delay) => {
                    state.hold_delayed(event, now + delay);
                    None
                }
                None => state.route(&self.config, event, now),
            }
        };

        if let Some(event) = inline {
            self.execute_event(event).await;
        }
        id
    }

    /// 以类型与载荷发射默认事件
    pub async fn emit_with(&self, event_type: impl Into<String>, payload: Value) -> EventId {
        self.emit(Event::new(event_type, payload)).await
    }

    /// 发射类型化载荷
    pub async fn emit_typed<P: EventPayload>(&self, payload: &P) -> EngineResult<EventId> {
        let event = Event::from_payload(payload)?;
        Ok(self.emit(event).await)
    }

    // --- 处理器 ---

    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.registry.register(handler);
    }

    pub fn unregister_handler(&self, handler_id: &str) -> EngineResult<()> {
        self.registry.unregister(handler_id).map(|_| ())
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    // --- 控制 ---

    pub fn pause(&self) {
        info!("event processing paused");
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        info!("event processing resumed");
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 立即转发全部防抖事件、交付全部未满批次，并处理完队列（暂停时同样执行）
    pub async fn flush(&self) {
        let work = {
            let mut state = self.state();
            state.flush_coordinators(&self.config);
            state.take_work(usize::MAX)
        };
        info!(units = work.len(), "flushing pending events");
        self.dispatch(work).await;
    }

    /// 停止引擎：清空全部待处理状态、历史与处理器
    pub fn destroy(&self) {
        info!("destroying event engine");
        self.paused.store(true, Ordering::Release);
        {
            let mut state = self.state();
            state.clear_pending();
            state.history.clear();
        }
        self.registry.clear();
        self.token.cancel();
    }

    // --- 统计与历史 ---

    pub fn get_stats(&self) -> EventStats {
        let state = self.state();
        state.stats.snapshot(state.gauges())
    }

    pub fn clear_performance_data(&self) {
        let mut state = self.state();
        state.stats = EventStats::default();
        state.debounce.reset_counters();
        state.throttle.reset_counters();
    }

    /// 按时间先后返回最近的 `limit` 条历史（缺省全部）
    pub fn get_event_history(&self, limit: Option<usize>) -> Vec<Event> {
        self.state().history.recent(limit)
    }

    /// 以新事件的形式重放满足条件的历史事件，返回重放数量
    pub async fn replay_events<F>(&self, filter: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        let events = self.state().history.filtered(filter);
        info!(count = events.len(), "replaying events");

        for event in &events {
            let replay = event.to_replay();
            self.state().stats.replayed_events += 1;
            self.emit(replay).await;
            time::sleep(self.config.replay_interval).await;
        }
        events.len()
    }

    pub async fn replay_all(&self) -> usize {
        self.replay_events(|_| true).await
    }

    // --- 分发 ---

    async fn dispatch(&self, work: Vec<Work>) {
        let limit = self.config.max_concurrent_processing;
        stream::iter(work)
            .for_each_concurrent(Some(limit), |unit| self.run(unit))
            .await;
    }

    async fn run(&self, unit: Work) {
        match unit {
            Work::Single(event) => self.execute_event(event).await,
            Work::Batch(events) => self.execute_batch(events).await,
        }
    }

    async fn execute_event(&self, mut event: Event) {
        if event.is_expired(Utc::now()) {
            debug!(event_id = event.id(), "event expired before dispatch");
            self.state().stats.expired_events += 1;
            return;
        }

        let handlers = self.registry.handlers_for(event.event_type());
        if handlers.is_empty() {
            self.finish_unhandled(std::slice::from_mut(&mut event));
            return;
        }

        let started = Instant::now();
        for handler in &handlers {
            if !accepts(handler.as_ref(), &event) {
                continue;
            }

            let (outcome, retries) = self
                .invoke(handler, Target::Single(&event), event.max_retries())
                .await;
            if retries > 0 {
                event.add_retries(retries);
                self.state().stats.retried_invocations += u64::from(retries);
            }
            if let Err(err) = outcome {
                self.report_failure(handler.as_ref(), &err, std::slice::from_ref(&event));
            }
        }

        self.finish_processed(std::slice::from_mut(&mut event), started.elapsed());
    }

    async fn execute_batch(&self, events: Vec<Event>) {
        let now = Utc::now();
        let (live, expired): (Vec<Event>, Vec<Event>) =
            events.into_iter().partition(|e| !e.is_expired(now));
        if !expired.is_empty() {
            debug!(count = expired.len(), "batched events expired before dispatch");
            self.state().stats.expired_events += expired.len() as u64;
        }

        // 按事件类型分组，组内保持批次顺序
        let mut groups: Vec<(String, Vec<Event>)> = Vec::new();
        for event in live {
            match groups.iter_mut().find(|(ty, _)| ty == event.event_type()) {
                Some((_, group)) => group.push(event),
                None => groups.push((event.event_type().to_string(), vec![event])),
            }
        }

        for (event_type, group) in groups {
            self.execute_group(&event_type, group).await;
        }
    }

    async fn execute_group(&self, event_type: &str, mut group: Vec<Event>) {
        let handlers = self.registry.handlers_for(event_type);
        if handlers.is_empty() {
            self.finish_unhandled(&mut group);
            return;
        }

        let started = Instant::now();
        let max_retries = group.iter().filter_map(Event::max_retries).max();

        for handler in &handlers {
            let accepted: Vec<usize> = (0..group.len())
                .filter(|&i| accepts(handler.as_ref(), &group[i]))
                .collect();
            if accepted.is_empty() {
                continue;
            }
            let subset: Vec<Event> = accepted.iter().map(|&i| group[i].clone()).collect();

            let target = match subset.as_slice() {
                [single] => Target::Single(single),
                many => Target::Batch(many),
            };
            let (outcome, retries) = self.invoke(handler, target, max_retries).await;
            if retries > 0 {
                for &i in &accepted {
                    group[i].add_retries(retries);
                }
                self.state().stats.retried_invocations += u64::from(retries);
            }
            if let Err(err) = outcome {
                self.report_failure(handler.as_ref(), &err, &subset);
            }
        }

        let per_event = started.elapsed() / group.len().max(1) as u32;
        self.finish_processed(&mut group, per_event);
    }

    /// 调用处理器，失败时按配置重试；返回最终结果与重试次数
    async fn invoke(
        &self,
        handler: &Arc<dyn EventHandler>,
        target: Target<'_>,
        max_retries_override: Option<u32>,
    ) -> (Result<(), EngineError>, u32) {
        let cfg = handler.config();
        let max_retries = max_retries_override.unwrap_or(cfg.max_retries);
        let timeout = cfg.timeout.or(self.config.handler_timeout);

        let mut attempt = 0;
        loop {
            match invoke_once(handler.as_ref(), target, timeout).await {
                Ok(()) => return (Ok(()), attempt),
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        handler = handler.handler_id(),
                        attempt,
                        error = %err,
                        "handler failed, retrying"
                    );
                    let wait = cfg.retry_strategy.backoff(cfg.retry_delay, attempt);
                    if !wait.is_zero() {
                        time::sleep(wait).await;
                    }
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }

    fn report_failure(&self, handler: &dyn EventHandler, err: &EngineError, events: &[Event]) {
        let Some(first) = events.first() else {
            return;
        };
        error!(
            handler = handler.handler_id(),
            event_id = first.id(),
            event_type = first.event_type(),
            error = %err,
            "event handler failed"
        );
        self.state().stats.record_failure(first.event_type());

        for event in events {
            shielded(handler.handler_id(), "on_error hook", || handler.on_error(err, event));
            shielded(event.id(), "on_error callback", || event.callbacks().error(event, err));
        }
    }

    fn finish_processed(&self, events: &mut [Event], elapsed: Duration) {
        {
            let mut state = self.state();
            for event in events.iter_mut() {
                event.mark_processed();
                state.stats.record_processed(event, elapsed);
                state.history.mark_processed(event.id(), event.retry_count());
            }
        }
        for event in events.iter() {
            shielded(event.id(), "on_success callback", || event.callbacks().success(event));
            shielded(event.id(), "on_complete callback", || event.callbacks().complete(event));
        }
    }

    fn finish_unhandled(&self, events: &mut [Event]) {
        if let Some(first) = events.first() {
            warn!(
                event_id = first.id(),
                event_type = first.event_type(),
                count = events.len(),
                "no handler registered for event type"
            );
        }
        {
            let mut state = self.state();
            for event in events.iter_mut() {
                event.mark_processed();
                state.stats.unhandled_events += 1;
                state.history.mark_processed(event.id(), event.retry_count());
            }
        }
        for event in events.iter() {
            shielded(event.id(), "on_complete callback", || event.callbacks().complete(event));
        }
    }
}

/// 分类过滤与 `can_handle` 共同决定处理器是否接收该事件；判定过程 panic 视为不接收
fn accepts(handler: &dyn EventHandler, event: &Event) -> bool {
    shielded(handler.handler_id(), "accept check", || {
        let category_ok = handler
            .categories()
            .is_none_or(|cats| cats.iter().any(|c| c == event.category()));
        category_ok && handler.can_handle(event)
    })
    .unwrap_or(false)
}

/// 执行用户回调/钩子，panic 被捕获并记录，不向分发流程传播
fn shielded<R>(owner: &str, what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(
                owner,
                callback = what,
                reason = %panic_message(payload.as_ref()),
                "user callback panicked"
            );
            None
        }
    }
}

/// 分发任务结束（包括 unwind 或被取消）时清除处理中标记
struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn invoke_once(
    handler: &dyn EventHandler,
    target: Target<'_>,
    timeout: Option<Duration>,
) -> Result<(), EngineError> {
    let call = AssertUnwindSafe(async move {
        match target {
            Target::Single(event) => handler.handle(event).await,
            Target::Batch(events) => handler.handle_batch(events).await,
        }
    })
    .catch_unwind();

    let outcome = match timeout {
        Some(limit) => match time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(EngineError::HandlerTimeout {
                    handler: handler.handler_id().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                });
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(EngineError::handler_execution(
            handler.handler_id(),
            format!("{err:#}"),
        )),
        Err(panic) => Err(EngineError::handler_execution(
            handler.handler_id(),
            panic_message(panic.as_ref()),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// 引擎运行句柄：用于优雅关闭与等待任务结束
pub struct EngineHandle {
    token: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn shutdown(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }

    /// 放弃句柄但保持循环运行（直到 `destroy`）
    pub fn detach(self) {
        drop(self.into_detached());
    }

    /// 保留任务句柄但不再在 drop 时关闭循环
    pub(crate) fn into_detached(mut self) -> Self {
        self.token = None;
        self
    }

    /// 循环任务是否均已结束（被关闭，或所在运行时已停止）
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, ThrottleConfig};
    use crate::eventing::handler::{FnHandler, HandledEventType};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn engine_with(config: EventEngineConfig) -> EventEngine {
        EventEngine::builder().config(config).build().unwrap()
    }

    fn counting(id: &str, ty: &str, counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler::new(id, ty, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let config = EventEngineConfig {
            max_concurrent_processing: 0,
            ..EventEngineConfig::default()
        };
        assert!(matches!(
            EventEngine::builder().config(config).build(),
            Err(EngineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn route_places_events_by_strategy() {
        let config = EventEngineConfig::default();
        let mut state = EngineState::new(&config);
        let now = Instant::now();

        let immediate = Event::builder()
            .event_type("x")
            .priority(EventPriority::Immediate)
            .build();
        assert!(state.route(&config, immediate, now).is_some());

        state.route(&config, Event::new("x", json!({})), now);
        state.route(
            &config,
            Event::builder().event_type("q").strategy(EventStrategy::Queue).build(),
            now,
        );
        state.route(
            &config,
            Event::builder().event_type("d").strategy(EventStrategy::Debounce).build(),
            now,
        );
        state.route(
            &config,
            Event::builder().event_type("b").strategy(EventStrategy::Batch).build(),
            now,
        );

        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.debounce.pending_count(), 1);
        assert_eq!(state.batch.pending_count(), 1);
    }

    #[test]
    fn fire_timers_moves_expired_state_into_queue() {
        let config = EventEngineConfig {
            throttle: ThrottleConfig {
                trailing: true,
                ..ThrottleConfig::default()
            },
            batch: BatchConfig {
                max_wait: Duration::from_millis(10),
                ..BatchConfig::default()
            },
            ..EventEngineConfig::default()
        };
        let mut state = EngineState::new(&config);
        let t0 = Instant::now();

        let throttled = |n: u64| {
            Event::builder()
                .event_type("t")
                .strategy(EventStrategy::Throttle)
                .payload(json!({ "n": n }))
                .build()
        };
        state.route(&config, throttled(1), t0);
        state.route(&config, throttled(2), t0 + Duration::from_millis(10));
        state.route(
            &config,
            Event::builder()
                .event_type("d")
                .strategy(EventStrategy::Debounce)
                .debounce(Duration::from_millis(20))
                .build(),
            t0,
        );
        state.route(
            &config,
            Event::builder().event_type("b").strategy(EventStrategy::Batch).build(),
            t0,
        );
        state.hold_delayed(
            Event::builder().event_type("late").strategy(EventStrategy::Queue).build(),
            t0 + Duration::from_millis(50),
        );
        assert_eq!(state.queue.len(), 1);

        state.fire_timers(&config, t0 + Duration::from_millis(100));
        // 节流首个 + 节流尾随 + 防抖 + 延迟事件
        assert_eq!(state.queue.len(), 4);
        assert_eq!(state.ready_batches.len(), 1);
        assert!(state.delayed_events.is_empty());
    }

    #[test]
    fn take_work_prefers_ready_batches_and_respects_limit() {
        let config = EventEngineConfig::default();
        let mut state = EngineState::new(&config);
        state.ready_batches.push_back(vec![Event::new("b", json!({}))]);
        for _ in 0..5 {
            state.enqueue(Event::new("x", json!({})));
        }

        let work = state.take_work(3);
        assert_eq!(work.len(), 3);
        assert!(matches!(work[0], Work::Batch(_)));
        assert_eq!(state.queue.len(), 3);
    }

    #[test]
    fn merge_counts_and_coalesces() {
        let config = EventEngineConfig::default();
        let mut state = EngineState::new(&config);
        let now = Instant::now();
        let merge = |payload: Value| {
            Event::builder()
                .event_type("m")
                .strategy(EventStrategy::Merge)
                .payload(payload)
                .build()
        };
        state.route(&config, merge(json!({"a": 1})), now);
        state.route(&config, merge(json!({"b": 2})), now);

        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.stats.merged_events, 1);
        let merged = state.queue.dequeue().unwrap();
        assert_eq!(merged.payload(), &json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn immediate_priority_runs_inside_emit() {
        let engine = engine_with(EventEngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        engine.register_handler(counting("h", "ping", hits.clone()));

        engine
            .emit(
                Event::builder()
                    .event_type("ping")
                    .priority(EventPriority::Immediate)
                    .build(),
            )
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let stats = engine.get_stats();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.processed_events, 1);
        assert!(engine.get_event_history(None)[0].is_processed());
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let engine = engine_with(EventEngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        engine.register_handler(Arc::new(
            FnHandler::new("boom", "ping", |event: Event| async move {
                if event.event_type() == "ping" {
                    panic!("kaboom");
                }
                Ok(())
            })
            .with_priority(EventPriority::High),
        ));
        engine.register_handler(counting("after", "ping", hits.clone()));

        engine.emit_with("ping", json!({})).await;
        engine.flush().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let stats = engine.get_stats();
        assert_eq!(stats.failed_events, 1);
        assert_eq!(stats.processed_events, 1);
    }

    struct PickyHandler;

    #[async_trait::async_trait]
    impl EventHandler for PickyHandler {
        fn handler_id(&self) -> &str {
            "picky"
        }

        fn handled_event_type(&self) -> HandledEventType {
            "ping".into()
        }

        fn can_handle(&self, _event: &Event) -> bool {
            panic!("cannot decide")
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_accept_check_skips_only_that_handler() {
        let engine = engine_with(EventEngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        engine.register_handler(Arc::new(PickyHandler));
        engine.register_handler(counting("after", "ping", hits.clone()));

        engine.emit_with("ping", json!({})).await;
        engine.flush().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get_stats().processed_events, 1);
    }

    #[test]
    fn processing_flag_resets_when_dispatch_unwinds() {
        let flag = AtomicBool::new(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _idle = ResetOnDrop(&flag);
            panic!("dispatch died");
        }));
        assert!(outcome.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn expired_events_are_skipped() {
        let engine = engine_with(EventEngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        engine.register_handler(counting("h", "x", hits.clone()));

        let stale = Event::builder()
            .event_type("x")
            .timestamp(Utc::now() - chrono::Duration::seconds(10))
            .ttl(Duration::from_secs(1))
            .build();
        engine.emit(stale).await;
        engine.flush().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(engine.get_stats().expired_events, 1);
    }

    #[tokio::test]
    async fn unhandled_events_count_as_processed_without_handlers() {
        let engine = engine_with(EventEngineConfig::default());
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        let event = Event::builder()
            .event_type("nobody")
            .callbacks(crate::event::EventCallbacks::new().on_complete(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build();

        engine.emit(event).await;
        engine.flush().await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        let stats = engine.get_stats();
        assert_eq!(stats.unhandled_events, 1);
        assert_eq!(stats.processed_events, 0);
    }

    #[tokio::test]
    async fn category_gate_filters_handlers() {
        let engine = engine_with(EventEngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        engine.register_handler(Arc::new(
            FnHandler::new("sys", "x", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_categories(["system"]),
        ));

        engine.emit_with("x", json!({})).await;
        engine
            .emit(Event::builder().event_type("x").category("system").build())
            .await;
        engine.flush().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
