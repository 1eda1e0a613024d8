//! 截止时间队列（DeadlineQueue）
//!
//! 以单个最小堆承载某一协调器的全部按键定时器，由处理循环的节拍统一轮询，
//! 不为每个键创建独立的运行时定时器。取消采用惰性方式：堆中过期的条目在弹出时
//! 通过序号比对被丢弃。
//!
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use tokio::time::Instant;

#[derive(Debug)]
pub struct DeadlineQueue<K> {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    /// 序号 -> 键（仅包含仍然有效的定时器）
    live: HashMap<u64, K>,
    /// 键 -> 当前有效序号
    by_key: HashMap<K, u64>,
    next_seq: u64,
}

impl<K> Default for DeadlineQueue<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            by_key: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K> DeadlineQueue<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 为键设置（或重置）截止时间，旧定时器随之失效
    pub fn schedule(&mut self, key: K, deadline: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(old) = self.by_key.insert(key.clone(), seq) {
            self.live.remove(&old);
        }
        self.live.insert(seq, key);
        self.heap.push(Reverse((deadline, seq)));
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.by_key.remove(key) {
            Some(seq) => {
                self.live.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// 弹出所有截止时间不晚于 `now` 的键，按截止时间先后返回
    pub fn pop_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired = Vec::new();

        while let Some(Reverse((deadline, seq))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();

            if let Some(key) = self.live.remove(&seq) {
                self.by_key.remove(&key);
                expired.push(key);
            }
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.by_key.clear();
    }
}
