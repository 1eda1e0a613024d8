//! 优先级分发队列（DispatchQueue）
//!
//! 按 (优先级升序, 时间戳升序) 有序存放待处理事件，二分查找定位插入点；
//! 相同键的事件插在已有事件之后，保证同一优先级内先到先出。
//! 达到容量时拒绝新事件（丢弃并告警），不阻塞生产方。
//!
use crate::error::EngineError;
use crate::event::{Event, EventStrategy};
use std::cmp::Ordering;
use tracing::{trace, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct DispatchQueue {
    events: Vec<Event>,
    capacity: usize,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity,
        }
    }

    /// 入队；队列已满时丢弃事件并返回 `false`
    pub fn enqueue(&mut self, event: Event) -> bool {
        if self.events.len() >= self.capacity {
            let err = EngineError::QueueOverflow {
                capacity: self.capacity,
            };
            warn!(
                event_id = event.id(),
                event_type = event.event_type(),
                error = %err,
                "dropping event"
            );
            return false;
        }

        let at = self.insert_position(&event);
        trace!(event_id = event.id(), position = at, "enqueue");
        self.events.insert(at, event);
        true
    }

    pub fn dequeue(&mut self) -> Option<Event> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    /// 按队列顺序取出至多 `max` 个满足过滤条件的事件，不满足的原位保留
    pub fn dequeue_batch<F>(&mut self, max: usize, filter: Option<F>) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        if max == 0 || self.events.is_empty() {
            return Vec::new();
        }

        let mut taken = Vec::with_capacity(max.min(self.events.len()));
        let mut kept = Vec::with_capacity(self.events.len());

        for event in self.events.drain(..) {
            let matches = filter.as_ref().is_none_or(|f| f(&event));
            if taken.len() < max && matches {
                taken.push(event);
            } else {
                kept.push(event);
            }
        }

        self.events = kept;
        taken
    }

    /// 查找队列中可与之合并的事件：同一关联键且同为合并策略
    pub(crate) fn merge_into(&mut self, incoming: &Event) -> Option<String> {
        let key = incoming.correlation_key();
        let pos = self.events.iter().position(|e| {
            e.strategy() == EventStrategy::Merge
                && e.event_type() == key.event_type()
                && e.correlation_id() == key.correlation_id()
        })?;

        // 合并会刷新时间戳，重新定位以维持排序不变式
        let mut existing = self.events.remove(pos);
        existing.merge_from(incoming);
        let id = existing.id().to_string();
        let at = self.insert_position(&existing);
        self.events.insert(at, existing);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    fn insert_position(&self, event: &Event) -> usize {
        self.events.partition_point(|queued| {
            match queued.priority().cmp(&event.priority()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => queued.timestamp() <= event.timestamp(),
            }
        })
    }
}
