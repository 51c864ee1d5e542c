//! 记忆子系统：短期（LRU）、长期、位置三个索引的组合
//!
//! 与调度无关；短期溢出时按晋升策略把被淘汰条目复制进长期记忆。

use crate::memory::{Eviction, LocationIndex, LongTermMemory, PromotionPolicy, ShortTermMemory};
use crate::world::Coord;

/// 默认短期记忆容量
pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 10;

#[derive(Debug)]
pub struct MemoryStore {
    pub short_term: ShortTermMemory,
    pub long_term: LongTermMemory,
    pub locations: LocationIndex,
}

impl MemoryStore {
    pub fn new(short_term_capacity: usize) -> Self {
        Self {
            short_term: ShortTermMemory::new(short_term_capacity),
            long_term: LongTermMemory::new(),
            locations: LocationIndex::new(),
        }
    }

    pub fn with_policy(short_term_capacity: usize, policy: impl PromotionPolicy + 'static) -> Self {
        Self {
            short_term: ShortTermMemory::with_policy(short_term_capacity, policy),
            long_term: LongTermMemory::new(),
            locations: LocationIndex::new(),
        }
    }

    /// 写入短期记忆；若发生淘汰且策略同意，则复制到长期记忆。返回淘汰记录供调用方记日志
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<Eviction> {
        let eviction = self.short_term.insert(key, value)?;
        if eviction.promote {
            tracing::debug!(key = %eviction.key, "promoting evicted short-term memory");
            self.long_term.insert(eviction.key.clone(), eviction.value.clone());
        }
        Some(eviction)
    }

    /// 先查短期（并触碰），再查长期
    pub fn recall(&mut self, key: &str) -> Option<String> {
        self.short_term
            .get(key)
            .or_else(|| self.long_term.get(key).map(str::to_string))
    }

    pub fn add_location(&mut self, name: impl Into<String>, at: Coord) {
        self.locations.insert(name, at);
    }

    /// 供 prompt 使用的记忆段落
    pub fn to_prompt_section(&self) -> String {
        let mut s = String::new();
        if !self.short_term.is_empty() {
            s.push_str("## Recent memory\n");
            for key in self.short_term.keys() {
                if let Some(v) = self.short_term.peek(key) {
                    s.push_str(&format!("- {key}: {v}\n"));
                }
            }
        }
        if !self.locations.is_empty() {
            s.push_str("## Known places\n");
            for (name, at) in self.locations.iter() {
                s.push_str(&format!("- {name}: {at}\n"));
            }
        }
        s
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_TERM_CAPACITY)
    }
}
