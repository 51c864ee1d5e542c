//! 短期记忆：容量固定的 key→text 索引，按最近使用淘汰
//!
//! insert / touch 会把 key 移到最近使用位置；超出容量时淘汰最久未触碰的一条，
//! 并交给 PromotionPolicy 决定是否晋升到长期记忆。

use std::collections::{HashMap, VecDeque};

/// 晋升策略：被淘汰的短期记忆是否写入长期记忆
pub trait PromotionPolicy: Send + Sync {
    fn should_promote(&self, key: &str, value: &str) -> bool;
}

/// 基线策略：总是晋升
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPromote;

impl PromotionPolicy for AlwaysPromote {
    fn should_promote(&self, _key: &str, _value: &str) -> bool {
        true
    }
}

impl<F> PromotionPolicy for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn should_promote(&self, key: &str, value: &str) -> bool {
        self(key, value)
    }
}

/// 一次淘汰的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub key: String,
    pub value: String,
    pub promote: bool,
}

/// 短期记忆索引（LRU）
pub struct ShortTermMemory {
    entries: HashMap<String, String>,
    /// 队头最久未使用，队尾最近使用
    order: VecDeque<String>,
    capacity: usize,
    policy: Box<dyn PromotionPolicy>,
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, AlwaysPromote)
    }

    pub fn with_policy(capacity: usize, policy: impl PromotionPolicy + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            policy: Box::new(policy),
        }
    }

    /// 写入或更新；超出容量时返回被淘汰的条目
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<Eviction> {
        let key = key.into();
        self.entries.insert(key.clone(), value.into());
        self.touch(&key);
        if self.order.len() <= self.capacity {
            return None;
        }
        let oldest = self.order.pop_front()?;
        let value = self.entries.remove(&oldest)?;
        let promote = self.policy.should_promote(&oldest, &value);
        Some(Eviction {
            key: oldest,
            value,
            promote,
        })
    }

    /// 把 key 移到最近使用位置；key 不存在时返回 false
    pub fn touch(&mut self, key: &str) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
        true
    }

    /// 读取并触碰
    pub fn get(&mut self, key: &str) -> Option<String> {
        if self.touch(key) {
            self.entries.get(key).cloned()
        } else {
            None
        }
    }

    /// 只读查看，不改变使用顺序
    pub fn peek(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 按最久未使用 → 最近使用的顺序返回所有 key
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ShortTermMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortTermMemory")
            .field("capacity", &self.capacity)
            .field("order", &self.order)
            .finish()
    }
}
