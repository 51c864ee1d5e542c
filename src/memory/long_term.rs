//! 长期记忆与位置记忆：无淘汰的 key→text / key→坐标 索引
//!
//! 长期记忆除按 key 精确读取外，还支持按关键词重叠检索（供 prompt 拼接「相关经验」）。

use std::collections::{BTreeMap, HashSet};

use crate::world::Coord;

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| c.is_whitespace() || c == '_' || c == ',' || c == '.')
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 长期记忆：key→text，无容量上限
#[derive(Debug, Clone, Default)]
pub struct LongTermMemory {
    entries: BTreeMap<String, String>,
}

impl LongTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 按查询检索最相关的 k 条（key 与 value 都参与匹配），返回 (key, value)
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, String)> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &String, &String)> = self
            .entries
            .iter()
            .map(|(key, value)| {
                let doc = tokenize_lower(&format!("{key} {value}"));
                (query_tokens.intersection(&doc).count(), key, value)
            })
            .filter(|(s, _, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(_, key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 位置记忆：地名 → 坐标，无容量上限
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    places: BTreeMap<String, Coord>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, at: Coord) {
        self.places.insert(name.into(), at);
    }

    pub fn get(&self, name: &str) -> Option<Coord> {
        self.places.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Coord)> {
        self.places.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}
