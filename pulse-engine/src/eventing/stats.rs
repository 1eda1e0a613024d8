//! 引擎统计（EventStats）
//!
//! 计数器在事件流转过程中累加；队列长度、待处理数量等瞬时值在读取快照时填充。
//!
use crate::event::{Event, EventPriority};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// 每条历史记录的估算内存占用（字节）
const ESTIMATED_BYTES_PER_HISTORY_ENTRY: usize = 100;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventTypeStats {
    pub count: u64,
    pub processed: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_processing_time_ms: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PriorityStats {
    pub count: u64,
    pub processed: u64,
    pub avg_processing_time_ms: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// 被后续事件取代的防抖事件占比
    pub debounce_hit_rate: f64,
    /// 被节流抑制的事件占比
    pub throttle_hit_rate: f64,
    /// 批次大小相对默认上限的指数移动平均
    pub batch_efficiency: f64,
    /// 历史记录的估算内存占用（字节）
    pub memory_usage: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub total_events: u64,
    pub processed_events: u64,
    pub failed_events: u64,
    pub dropped_events: u64,
    pub merged_events: u64,
    pub expired_events: u64,
    pub unhandled_events: u64,
    pub replayed_events: u64,
    pub retried_invocations: u64,
    pub average_processing_time_ms: f64,

    pub queue_size: usize,
    pub pending_debounce: usize,
    pub pending_throttle: usize,
    pub pending_batches: usize,
    pub history_size: usize,

    pub event_type_stats: BTreeMap<String, EventTypeStats>,
    pub priority_stats: BTreeMap<EventPriority, PriorityStats>,
    pub performance: PerformanceStats,
}

/// 读取快照时由引擎提供的瞬时值
#[derive(Debug, Default)]
pub(crate) struct Gauges {
    pub queue_size: usize,
    pub pending_debounce: usize,
    pub pending_throttle: usize,
    pub pending_batches: usize,
    pub history_size: usize,
    pub debounce_superseded: u64,
    pub debounce_forwarded: u64,
    pub throttle_suppressed: u64,
    pub throttle_executed: u64,
}

fn running_mean(current: f64, n: u64, sample: f64) -> f64 {
    if n == 0 {
        return sample;
    }
    current + (sample - current) / n as f64
}

fn ratio(part: u64, rest: u64) -> f64 {
    let total = part + rest;
    if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

impl EventStats {
    pub(crate) fn record_emitted(&mut self, event: &Event) {
        self.total_events += 1;
        let ty = self
            .event_type_stats
            .entry(event.event_type().to_string())
            .or_default();
        ty.count += 1;
        ty.error_rate = ty.errors as f64 / ty.count as f64;
        self.priority_stats.entry(event.priority()).or_default().count += 1;
    }

    pub(crate) fn record_processed(&mut self, event: &Event, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;

        self.processed_events += 1;
        self.average_processing_time_ms =
            running_mean(self.average_processing_time_ms, self.processed_events, ms);

        let ty = self
            .event_type_stats
            .entry(event.event_type().to_string())
            .or_default();
        ty.processed += 1;
        ty.avg_processing_time_ms = running_mean(ty.avg_processing_time_ms, ty.processed, ms);

        let pr = self.priority_stats.entry(event.priority()).or_default();
        pr.processed += 1;
        pr.avg_processing_time_ms = running_mean(pr.avg_processing_time_ms, pr.processed, ms);
    }

    pub(crate) fn record_failure(&mut self, event_type: &str) {
        self.failed_events += 1;
        let ty = self.event_type_stats.entry(event_type.to_string()).or_default();
        ty.errors += 1;
        if ty.count > 0 {
            ty.error_rate = ty.errors as f64 / ty.count as f64;
        }
    }

    pub(crate) fn record_batch(&mut self, size: usize, default_max_size: usize) {
        let efficiency = (size as f64 / default_max_size.max(1) as f64).min(1.0);
        let current = self.performance.batch_efficiency;
        self.performance.batch_efficiency = current * 0.9 + efficiency * 0.1;
    }

    /// 填充瞬时值后返回副本
    pub(crate) fn snapshot(&self, gauges: Gauges) -> EventStats {
        let mut stats = self.clone();
        stats.queue_size = gauges.queue_size;
        stats.pending_debounce = gauges.pending_debounce;
        stats.pending_throttle = gauges.pending_throttle;
        stats.pending_batches = gauges.pending_batches;
        stats.history_size = gauges.history_size;
        stats.performance.debounce_hit_rate =
            ratio(gauges.debounce_superseded, gauges.debounce_forwarded);
        stats.performance.throttle_hit_rate =
            ratio(gauges.throttle_suppressed, gauges.throttle_executed);
        stats.performance.memory_usage = gauges.history_size * ESTIMATED_BYTES_PER_HISTORY_ENTRY;
        stats
    }
}
