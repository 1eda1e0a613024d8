//! 防抖协调器（DebounceCoordinator）
//!
//! 按关联键折叠突发事件：静默期内持续到达的事件只保留最新一个，
//! 静默期结束后转发。可选 `leading`（突发首个事件立即转发）与
//! `max_wait`（突发持续过久时强制转发最新事件）。
//!
//! 协调器不持有运行时定时器，所有时间点由调用方以 `now` 传入。
//!
use super::timer::DeadlineQueue;
use crate::config::DebounceConfig;
use crate::event::{CorrelationKey, Event};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct PendingDebounce {
    /// 等待转发的最新事件；leading 模式下首个事件已转发时为空
    event: Option<Event>,
    /// 本轮突发开始的时间（用于 max_wait）
    first_seen: Instant,
}

#[derive(Debug, Default)]
pub struct DebounceCoordinator {
    pending: HashMap<CorrelationKey, PendingDebounce>,
    timers: DeadlineQueue<CorrelationKey>,
    superseded: u64,
    forwarded: u64,
}

impl DebounceCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接收一个防抖事件；返回需要立即转发的事件（仅 leading 模式下的突发首个事件）
    pub fn debounce(&mut self, event: Event, cfg: &DebounceConfig, now: Instant) -> Option<Event> {
        let delay = event.debounce().unwrap_or(cfg.delay);
        let key = event.correlation_key();

        if let Some(pending) = self.pending.get_mut(&key) {
            if pending.event.replace(event).is_some() {
                self.superseded += 1;
            }
            let mut deadline = now + delay;
            if let Some(max_wait) = cfg.max_wait {
                deadline = deadline.min(pending.first_seen + max_wait);
            }
            debug!(key = %key, "debounce window extended");
            self.timers.schedule(key, deadline);
            return None;
        }

        self.timers.schedule(key.clone(), now + delay);
        if cfg.leading {
            self.forwarded += 1;
            self.pending.insert(
                key,
                PendingDebounce {
                    event: None,
                    first_seen: now,
                },
            );
            Some(event)
        } else {
            self.pending.insert(
                key,
                PendingDebounce {
                    event: Some(event),
                    first_seen: now,
                },
            );
            None
        }
    }

    /// 取出所有静默期已结束的事件
    pub fn poll_expired(&mut self, now: Instant) -> Vec<Event> {
        let mut ready = Vec::new();
        for key in self.timers.pop_expired(now) {
            if let Some(event) = self.pending.remove(&key).and_then(|p| p.event) {
                self.forwarded += 1;
                ready.push(event);
            }
        }
        ready
    }

    /// 取消全部定时器，并交出所有待转发事件
    pub fn flush(&mut self) -> Vec<Event> {
        self.timers.clear();
        let events: Vec<Event> = self
            .pending
            .drain()
            .filter_map(|(_, p)| p.event)
            .collect();
        self.forwarded += events.len() as u64;
        events
    }

    /// 丢弃全部待转发事件
    pub fn clear(&mut self) {
        self.timers.clear();
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|p| p.event.is_some()).count()
    }

    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn reset_counters(&mut self) {
        self.superseded = 0;
        self.forwarded = 0;
    }
}
