//! 节流协调器（ThrottleCoordinator）
//!
//! 按关联键限制执行频率：每个窗口（`interval`）内至多执行一次。
//! - `leading`：窗口开始时立即执行到达的事件；
//! - `trailing`：窗口内被抑制的最后一个事件在窗口结束时执行。
//!
use super::timer::DeadlineQueue;
use crate::config::ThrottleConfig;
use crate::event::{CorrelationKey, Event};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 节流判定结果
#[derive(Debug)]
pub enum ThrottleDecision {
    /// 立即执行
    Execute(Event),
    /// 暂存，窗口结束时执行
    Deferred,
    /// 被抑制丢弃
    Dropped,
}

#[derive(Debug)]
struct ThrottleState {
    last_execution: Option<Instant>,
    interval: Duration,
    trailing: Option<Event>,
}

#[derive(Debug, Default)]
pub struct ThrottleCoordinator {
    states: HashMap<CorrelationKey, ThrottleState>,
    timers: DeadlineQueue<CorrelationKey>,
    executed: u64,
    throttled: u64,
}

impl ThrottleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn throttle(&mut self, event: Event, cfg: &ThrottleConfig, now: Instant) -> ThrottleDecision {
        let interval = event.throttle().unwrap_or(cfg.interval);
        let key = event.correlation_key();
        let state = self.states.entry(key.clone()).or_insert(ThrottleState {
            last_execution: None,
            interval,
            trailing: None,
        });
        state.interval = interval;

        let window_open = state
            .last_execution
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);

        if window_open {
            // 上一窗口遗留的尾随事件已过时
            if state.trailing.take().is_some() {
                self.timers.cancel(&key);
                self.throttled += 1;
            }
            state.last_execution = Some(now);

            if cfg.leading {
                self.executed += 1;
                return ThrottleDecision::Execute(event);
            }
            if cfg.trailing {
                state.trailing = Some(event);
                self.timers.schedule(key, now + interval);
                return ThrottleDecision::Deferred;
            }
            self.throttled += 1;
            return ThrottleDecision::Dropped;
        }

        if cfg.trailing {
            if state.trailing.replace(event).is_some() {
                self.throttled += 1;
            }
            // 安排在当前窗口剩余时间结束后执行
            if let Some(last) = state.last_execution {
                self.timers.schedule(key.clone(), last + interval);
            }
            debug!(key = %key, "throttle deferred to window end");
            ThrottleDecision::Deferred
        } else {
            self.throttled += 1;
            debug!(key = %key, "throttled");
            ThrottleDecision::Dropped
        }
    }

    /// 取出所有到期的尾随事件；执行时间即为新的窗口起点
    pub fn poll_expired(&mut self, now: Instant) -> Vec<Event> {
        let mut ready = Vec::new();
        for key in self.timers.pop_expired(now) {
            if let Some(state) = self.states.get_mut(&key)
                && let Some(event) = state.trailing.take()
            {
                state.last_execution = Some(now);
                self.executed += 1;
                ready.push(event);
            }
        }

        // 窗口已结束且无尾随事件的键与从未出现过的键等价
        self.states.retain(|_, s| {
            s.trailing.is_some()
                || s
                    .last_execution
                    .is_some_and(|last| now.saturating_duration_since(last) < s.interval)
        });
        ready
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.states.clear();
    }

    /// 等待窗口结束的尾随事件数
    pub fn pending_count(&self) -> usize {
        self.states.values().filter(|s| s.trailing.is_some()).count()
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn throttled(&self) -> u64 {
        self.throttled
    }

    pub fn reset_counters(&mut self) {
        self.executed = 0;
        self.throttled = 0;
    }
}
