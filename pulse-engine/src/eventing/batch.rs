//! 批处理协调器（BatchCoordinator）
//!
//! 按批次键（事件类型 + 分组字段值）累积事件，数量达到上限或首个事件
//! 等待超时后整批交付。交付前可按载荷字段排序。
//!
use super::timer::DeadlineQueue;
use crate::config::BatchConfig;
use crate::event::Event;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct PendingBatch {
    events: Vec<Event>,
    max_size: usize,
}

#[derive(Debug, Default)]
pub struct BatchCoordinator {
    batches: HashMap<String, PendingBatch>,
    timers: DeadlineQueue<String>,
}

/// 计算批次键：`type` 或 `type_v1_v2...`（缺失字段记为空串）
pub fn batch_key(event: &Event, group_by: &[String]) -> String {
    let mut key = event.event_type().to_string();
    if group_by.is_empty() {
        return key;
    }

    let parts: Vec<String> = group_by
        .iter()
        .map(|field| match event.payload_field(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
        .collect();
    key.push('_');
    key.push_str(&parts.join("_"));
    key
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个事件；批次满时返回整批（已排序）
    pub fn add(&mut self, event: Event, cfg: &BatchConfig, now: Instant) -> Option<Vec<Event>> {
        let key = batch_key(&event, &cfg.group_by);

        let batch = self.batches.entry(key.clone()).or_insert_with(|| {
            let wait = event.batch_timeout().unwrap_or(cfg.max_wait);
            self.timers.schedule(key.clone(), now + wait);
            PendingBatch {
                events: Vec::new(),
                max_size: event.batch_size().unwrap_or(cfg.max_size).max(1),
            }
        });
        batch.events.push(event);

        if batch.events.len() < batch.max_size {
            return None;
        }

        debug!(batch = %key, size = batch.events.len(), "batch full");
        self.timers.cancel(&key);
        self.batches
            .remove(&key)
            .map(|b| sort_batch(b.events, cfg.sort_by.as_deref()))
    }

    /// 取出所有等待超时的批次
    pub fn poll_expired(&mut self, cfg: &BatchConfig, now: Instant) -> Vec<Vec<Event>> {
        self.timers
            .pop_expired(now)
            .into_iter()
            .filter_map(|key| self.batches.remove(&key))
            .filter(|b| !b.events.is_empty())
            .map(|b| sort_batch(b.events, cfg.sort_by.as_deref()))
            .collect()
    }

    /// 立即交付全部未满批次
    pub fn flush_all(&mut self, cfg: &BatchConfig) -> Vec<Vec<Event>> {
        self.timers.clear();
        self.batches
            .drain()
            .map(|(_, b)| b.events)
            .filter(|events| !events.is_empty())
            .map(|events| sort_batch(events, cfg.sort_by.as_deref()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.batches.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.batches.len()
    }

    pub fn pending_events(&self) -> usize {
        self.batches.values().map(|b| b.events.len()).sum()
    }
}

/// 稳定排序：取载荷中的数值字段，缺失或非数值时使用事件时间戳（毫秒）
fn sort_batch(mut events: Vec<Event>, sort_by: Option<&str>) -> Vec<Event> {
    let Some(field) = sort_by else {
        return events;
    };

    let sort_key = |event: &Event| -> f64 {
        event
            .payload_field(field)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| event.timestamp().timestamp_millis() as f64)
    };
    events.sort_by(|a, b| sort_key(a).total_cmp(&sort_key(b)));
    events
}
