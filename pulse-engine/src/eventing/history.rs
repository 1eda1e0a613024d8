//! 事件历史（EventHistory）
//!
//! 有界的最近事件记录，供检查与重放。超过容量时裁剪到最近的一半。
//!
use crate::event::Event;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
        if self.events.len() > self.capacity {
            let keep = (self.capacity / 2).max(1);
            let excess = self.events.len() - keep;
            self.events.drain(..excess);
        }
    }

    /// 标记历史中的事件已处理，并同步重试次数
    pub(crate) fn mark_processed(&mut self, id: &str, retry_count: u32) {
        if let Some(entry) = self.events.iter_mut().rev().find(|e| e.id() == id) {
            entry.mark_processed();
            let delta = retry_count.saturating_sub(entry.retry_count());
            entry.add_retries(delta);
        }
    }

    /// 按时间先后返回最近的 `limit` 条（缺省全部）
    pub fn recent(&self, limit: Option<usize>) -> Vec<Event> {
        let skip = limit.map_or(0, |n| self.events.len().saturating_sub(n));
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn filtered<F>(&self, filter: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.events.iter().filter(|e| filter(e)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
