//! 共享状态：每个 Agent 一份，构造一次后以 Arc 传给所有组件
//!
//! 字段按组各自加锁（感知、体征、记忆、目标、社交、反射、待执行动作），临界区内不跨 await；
//! 感知组只由感知刷新写入，其余组件只读。跨 tick 的感知陈旧是可接受的。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::core::event_log::{EventLog, EventRole};
use crate::core::goals::{GoalPhase, GoalStack};
use crate::memory::{Eviction, MemoryStore};
use crate::world::{inventory_counts, Coord, MobSighting, Vitals};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 感知快照：由感知协作者整体覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerceptionSnapshot {
    /// 方块类型 → 最近坐标
    pub blocks: BTreeMap<String, Coord>,
    pub mobs: Vec<MobSighting>,
    pub players: Vec<String>,
}

/// 体征 + 背包
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VitalsState {
    pub vitals: Vitals,
    /// 每行 "item:count"
    pub inventory: Vec<String>,
}

/// 情感方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentDirection {
    /// 我对对方
    Outgoing,
    /// 对方对我
    Incoming,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sentiment {
    pub score: i32,
    pub reasons: Vec<String>,
}

/// 双向社交账本
#[derive(Debug, Clone, Default, Serialize)]
pub struct SocialLedger {
    pub outgoing: BTreeMap<String, Sentiment>,
    pub incoming: BTreeMap<String, Sentiment>,
}

impl SocialLedger {
    fn side_mut(&mut self, direction: SentimentDirection) -> &mut BTreeMap<String, Sentiment> {
        match direction {
            SentimentDirection::Outgoing => &mut self.outgoing,
            SentimentDirection::Incoming => &mut self.incoming,
        }
    }

    fn side(&self, direction: SentimentDirection) -> &BTreeMap<String, Sentiment> {
        match direction {
            SentimentDirection::Outgoing => &self.outgoing,
            SentimentDirection::Incoming => &self.incoming,
        }
    }
}

/// 快循环写入的反射标记
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflexState {
    /// 需要防御时记录攻击者（或最近的敌对生物）
    pub defend_against: Option<String>,
}

/// 供目标分解使用的环境快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct AmbientSnapshot {
    pub position: Coord,
    pub inventory: Vec<String>,
    pub nearby_blocks: Vec<String>,
    pub memory: String,
}

impl AmbientSnapshot {
    pub fn to_prompt_section(&self) -> String {
        let mut s = format!("Position: {}\n", self.position);
        if self.inventory.is_empty() {
            s.push_str("Inventory: (empty)\n");
        } else {
            s.push_str(&format!("Inventory: {}\n", self.inventory.join(", ")));
        }
        if !self.nearby_blocks.is_empty() {
            s.push_str(&format!("Nearby blocks: {}\n", self.nearby_blocks.join(", ")));
        }
        if !self.memory.is_empty() {
            s.push_str(&self.memory);
        }
        s
    }
}

/// 共享状态存储
#[derive(Debug)]
pub struct AgentState {
    name: String,
    perception: Mutex<PerceptionSnapshot>,
    vitals: Mutex<VitalsState>,
    memory: Mutex<MemoryStore>,
    goals: Mutex<GoalStack>,
    social: Mutex<SocialLedger>,
    reflex: Mutex<ReflexState>,
    pending_actions: Mutex<Vec<String>>,
    events: EventLog,
}

impl AgentState {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parts(name, MemoryStore::default(), EventLog::new())
    }

    pub fn with_parts(name: impl Into<String>, memory: MemoryStore, events: EventLog) -> Self {
        Self {
            name: name.into(),
            perception: Mutex::new(PerceptionSnapshot::default()),
            vitals: Mutex::new(VitalsState::default()),
            memory: Mutex::new(memory),
            goals: Mutex::new(GoalStack::new()),
            social: Mutex::new(SocialLedger::default()),
            reflex: Mutex::new(ReflexState::default()),
            pending_actions: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── 感知 ─────────────────────────────────────────────────────────────

    pub fn perception(&self) -> PerceptionSnapshot {
        lock(&self.perception).clone()
    }

    pub fn set_perception(&self, snapshot: PerceptionSnapshot) {
        *lock(&self.perception) = snapshot;
    }

    pub fn set_blocks(&self, blocks: BTreeMap<String, Coord>) {
        lock(&self.perception).blocks = blocks;
    }

    pub fn set_mobs(&self, mobs: Vec<MobSighting>) {
        lock(&self.perception).mobs = mobs;
    }

    pub fn set_players(&self, players: Vec<String>) {
        lock(&self.perception).players = players;
    }

    // ── 体征 / 背包 ─────────────────────────────────────────────────────

    pub fn vitals(&self) -> Vitals {
        lock(&self.vitals).vitals.clone()
    }

    pub fn set_vitals(&self, vitals: Vitals) {
        lock(&self.vitals).vitals = vitals;
    }

    pub fn inventory(&self) -> Vec<String> {
        lock(&self.vitals).inventory.clone()
    }

    pub fn set_inventory(&self, lines: Vec<String>) {
        lock(&self.vitals).inventory = lines;
    }

    pub fn inventory_counts(&self) -> BTreeMap<String, u32> {
        inventory_counts(&lock(&self.vitals).inventory)
    }

    // ── 记忆 ─────────────────────────────────────────────────────────────

    /// 在记忆锁内执行闭包（闭包内不得 await）
    pub fn with_memory<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        f(&mut lock(&self.memory))
    }

    pub fn remember(&self, key: impl Into<String>, value: impl Into<String>) -> Option<Eviction> {
        let eviction = self.with_memory(|m| m.remember(key, value));
        if let Some(ev) = &eviction {
            let promoted = if ev.promote { "promoted" } else { "dropped" };
            self.log(EventRole::System, format!("memory '{}' evicted ({promoted})", ev.key));
        }
        eviction
    }

    pub fn recall(&self, key: &str) -> Option<String> {
        self.with_memory(|m| m.recall(key))
    }

    pub fn add_location(&self, name: impl Into<String>, at: Coord) {
        self.with_memory(|m| m.add_location(name, at));
    }

    // ── 目标栈 ───────────────────────────────────────────────────────────

    /// 在目标锁内执行闭包，保证多字段修改的原子性
    pub fn with_goals<R>(&self, f: impl FnOnce(&mut GoalStack) -> R) -> R {
        f(&mut lock(&self.goals))
    }

    pub fn goals(&self) -> GoalStack {
        lock(&self.goals).clone()
    }

    pub fn goal_phase(&self) -> GoalPhase {
        lock(&self.goals).phase()
    }

    pub fn enqueue_goal(&self, goal: impl Into<String>) {
        let goal = goal.into();
        self.log(EventRole::Goal, format!("queued long-term goal: {goal}"));
        self.with_goals(|g| g.enqueue(goal));
    }

    // ── 社交 ─────────────────────────────────────────────────────────────

    pub fn update_sentiment(
        &self,
        person: &str,
        direction: SentimentDirection,
        delta: i32,
        reason: impl Into<String>,
    ) {
        let mut social = lock(&self.social);
        let entry = social.side_mut(direction).entry(person.to_string()).or_default();
        entry.score += delta;
        entry.reasons.push(reason.into());
    }

    pub fn sentiment(&self, person: &str, direction: SentimentDirection) -> Option<Sentiment> {
        lock(&self.social).side(direction).get(person).cloned()
    }

    pub fn social(&self) -> SocialLedger {
        lock(&self.social).clone()
    }

    // ── 反射 ─────────────────────────────────────────────────────────────

    pub fn flag_defense(&self, against: impl Into<String>) {
        lock(&self.reflex).defend_against = Some(against.into());
    }

    pub fn clear_defense(&self) -> Option<String> {
        lock(&self.reflex).defend_against.take()
    }

    pub fn defense_target(&self) -> Option<String> {
        lock(&self.reflex).defend_against.clone()
    }

    // ── 待执行动作 ───────────────────────────────────────────────────────

    pub fn add_pending_action(&self, action: impl Into<String>) {
        lock(&self.pending_actions).push(action.into());
    }

    /// 移除第一条相同的待执行动作
    pub fn complete_pending_action(&self, action: &str) {
        let mut pending = lock(&self.pending_actions);
        if let Some(pos) = pending.iter().position(|a| a == action) {
            pending.remove(pos);
        }
    }

    pub fn pending_actions(&self) -> Vec<String> {
        lock(&self.pending_actions).clone()
    }

    // ── 事件日志 ─────────────────────────────────────────────────────────

    pub fn log(&self, role: EventRole, content: impl Into<String>) -> u64 {
        self.events.append(role, content)
    }

    pub fn log_with(
        &self,
        role: EventRole,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> u64 {
        self.events.append_with(role, content, Some(metadata))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ── 渲染 ─────────────────────────────────────────────────────────────

    pub fn ambient(&self) -> AmbientSnapshot {
        let perception = self.perception();
        AmbientSnapshot {
            position: self.vitals().position,
            inventory: self.inventory(),
            nearby_blocks: perception.blocks.keys().cloned().collect(),
            memory: self.with_memory(|m| m.to_prompt_section()),
        }
    }

    /// 当前共享状态的文本摘要（每轮调度后写回 transcript）
    pub fn render_summary(&self) -> String {
        let vitals = self.vitals();
        let perception = self.perception();
        let goals = self.goals();
        let mut s = String::from("## Current state\n");
        s.push_str(&format!(
            "Health: {:.0}/20, Hunger: {:.0}/20, Position: {}\n",
            vitals.health, vitals.hunger, vitals.position
        ));
        if !vitals.equipment.is_empty() {
            let eq: Vec<String> = vitals
                .equipment
                .iter()
                .map(|(slot, item)| format!("{slot}={item}"))
                .collect();
            s.push_str(&format!("Equipment: {}\n", eq.join(", ")));
        }
        let inventory = self.inventory();
        if inventory.is_empty() {
            s.push_str("Inventory: (empty)\n");
        } else {
            s.push_str(&format!("Inventory: {}\n", inventory.join(", ")));
        }
        if !perception.blocks.is_empty() {
            let blocks: Vec<String> = perception
                .blocks
                .iter()
                .map(|(name, at)| format!("{name}@{at}"))
                .collect();
            s.push_str(&format!("Nearby blocks: {}\n", blocks.join(", ")));
        }
        if !perception.mobs.is_empty() {
            let mobs: Vec<String> = perception
                .mobs
                .iter()
                .map(|m| format!("{} ({:.1}m)", m.name, m.distance))
                .collect();
            s.push_str(&format!("Nearby mobs: {}\n", mobs.join(", ")));
        }
        if !perception.players.is_empty() {
            s.push_str(&format!("Nearby players: {}\n", perception.players.join(", ")));
        }
        if let Some(lt) = goals.long_term() {
            s.push_str(&format!("Long-term goal: {lt}\n"));
        }
        if let Some(st) = goals.short_term() {
            s.push_str(&format!("Short-term goal: {st}\n"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_visible_to_next_reader() {
        let state = AgentState::new("bot");
        state.set_inventory(vec!["oak_log:3".into(), "stick:2".into()]);
        assert_eq!(state.inventory_counts().get("oak_log"), Some(&3));
        state.set_mobs(vec![MobSighting {
            name: "zombie".into(),
            distance: 4.0,
        }]);
        assert_eq!(state.perception().mobs.len(), 1);
    }

    #[test]
    fn test_sentiment_both_directions() {
        let state = AgentState::new("bot");
        state.update_sentiment("alex", SentimentDirection::Outgoing, 2, "shared food");
        state.update_sentiment("alex", SentimentDirection::Outgoing, -1, "took my pickaxe");
        state.update_sentiment("alex", SentimentDirection::Incoming, 1, "thanked me");
        let mine = state.sentiment("alex", SentimentDirection::Outgoing).unwrap();
        assert_eq!(mine.score, 1);
        assert_eq!(mine.reasons.len(), 2);
        assert_eq!(state.sentiment("alex", SentimentDirection::Incoming).unwrap().score, 1);
        assert!(state.sentiment("sam", SentimentDirection::Incoming).is_none());
    }

    #[test]
    fn test_pending_actions_and_log() {
        let state = AgentState::new("bot");
        state.add_pending_action("mine(oak_log, 3)");
        state.add_pending_action("craft(stick, 1)");
        state.complete_pending_action("mine(oak_log, 3)");
        assert_eq!(state.pending_actions(), vec!["craft(stick, 1)".to_string()]);
        state.enqueue_goal("Acquire wooden pickaxe (1)");
        assert_eq!(state.events().len(), 1);
    }

    #[test]
    fn test_render_summary_mentions_goals_and_inventory() {
        let state = AgentState::new("bot");
        state.set_inventory(vec!["torch:4".into()]);
        state.with_goals(|g| {
            g.set_long_term("light the cave");
            g.set_short_term("Craft torch (4)").unwrap();
        });
        let summary = state.render_summary();
        assert!(summary.contains("torch:4"));
        assert!(summary.contains("Long-term goal: light the cave"));
        assert!(summary.contains("Short-term goal: Craft torch (4)"));
    }

    #[test]
    fn test_remember_logs_eviction() {
        let state = AgentState::with_parts("bot", MemoryStore::new(1), EventLog::new());
        state.remember("a", "1");
        state.remember("b", "2");
        assert_eq!(state.recall("a").as_deref(), Some("1"));
        assert!(state.events().last().unwrap().content.contains("evicted"));
    }
}
