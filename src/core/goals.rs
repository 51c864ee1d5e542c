//! 目标栈与目标状态机
//!
//! 长期目标 FIFO 队列 + 当前长期目标 + 当前短期目标 + locked-in 标记。
//! 不变量：只有存在长期目标时才能设置短期目标；清除长期目标会同时清除短期目标与剩余子步骤。

use std::collections::{BTreeMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::AgentError;

/// 慢循环看到的目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GoalPhase {
    NoGoal,
    HasLongTermNoShortTerm,
    HasShortTerm,
    LockedIn,
}

#[derive(Debug, Clone, Default)]
pub struct GoalStack {
    pending: VecDeque<String>,
    long_term: Option<String>,
    short_term: Option<String>,
    /// 当前长期目标分解后尚未执行的子步骤
    substeps: VecDeque<String>,
    locked_in: bool,
    /// 当前长期目标是否已做过首次分解
    broken_down: bool,
    /// 当前长期目标下短期目标被再次拆分的次数
    splits: u32,
    /// 当前短期目标已交给调度循环的次数
    dispatch_attempts: u32,
}

impl GoalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GoalPhase {
        match (&self.long_term, &self.short_term, self.locked_in) {
            (None, _, _) => GoalPhase::NoGoal,
            (Some(_), None, _) => GoalPhase::HasLongTermNoShortTerm,
            (Some(_), Some(_), false) => GoalPhase::HasShortTerm,
            (Some(_), Some(_), true) => GoalPhase::LockedIn,
        }
    }

    pub fn enqueue(&mut self, goal: impl Into<String>) {
        self.pending.push_back(goal.into());
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn long_term(&self) -> Option<&str> {
        self.long_term.as_deref()
    }

    pub fn short_term(&self) -> Option<&str> {
        self.short_term.as_deref()
    }

    pub fn substeps(&self) -> impl Iterator<Item = &str> {
        self.substeps.iter().map(String::as_str)
    }

    pub fn is_locked_in(&self) -> bool {
        self.locked_in
    }

    pub fn is_broken_down(&self) -> bool {
        self.broken_down
    }

    pub fn splits(&self) -> u32 {
        self.splits
    }

    pub fn dispatch_attempts(&self) -> u32 {
        self.dispatch_attempts
    }

    pub fn record_dispatch_attempt(&mut self) -> u32 {
        self.dispatch_attempts += 1;
        self.dispatch_attempts
    }

    /// 直接设置长期目标；旧的短期目标与子步骤一并清除
    pub fn set_long_term(&mut self, goal: impl Into<String>) {
        self.long_term = Some(goal.into());
        self.reset_long_term_progress();
    }

    /// 清除长期目标（原子地清除短期目标）
    pub fn clear_long_term(&mut self) {
        self.long_term = None;
        self.reset_long_term_progress();
    }

    pub fn set_short_term(&mut self, goal: impl Into<String>) -> Result<(), AgentError> {
        if self.long_term.is_none() {
            return Err(AgentError::GoalStack(
                "cannot set a short-term goal without a long-term goal".into(),
            ));
        }
        self.reset_short_term();
        self.short_term = Some(goal.into());
        Ok(())
    }

    /// 用分解结果替换子步骤：第一个成为短期目标，其余排队
    pub fn set_substeps(&mut self, steps: Vec<String>) -> Result<(), AgentError> {
        let mut steps: VecDeque<String> = steps.into();
        let Some(first) = steps.pop_front() else {
            return Err(AgentError::GoalStack("breakdown produced no substeps".into()));
        };
        self.set_short_term(first)?;
        self.substeps = steps;
        self.broken_down = true;
        Ok(())
    }

    /// 把短期目标再拆一层：第一个替换当前短期目标，其余插到剩余子步骤之前
    pub fn split_short_term(&mut self, steps: Vec<String>) -> Result<(), AgentError> {
        let mut steps: VecDeque<String> = steps.into();
        let Some(first) = steps.pop_front() else {
            return Err(AgentError::GoalStack("split produced no substeps".into()));
        };
        self.set_short_term(first)?;
        while let Some(step) = steps.pop_back() {
            self.substeps.push_front(step);
        }
        self.splits += 1;
        Ok(())
    }

    pub fn lock_in(&mut self) -> Result<(), AgentError> {
        if self.short_term.is_none() {
            return Err(AgentError::GoalStack("nothing to lock in".into()));
        }
        self.locked_in = true;
        Ok(())
    }

    pub fn unlock(&mut self) {
        self.locked_in = false;
    }

    /// 完成（或放弃）当前短期目标，取下一个子步骤；没有则清空短期目标并返回 None
    pub fn advance_short_term(&mut self) -> Option<&str> {
        self.reset_short_term();
        self.short_term = self.substeps.pop_front();
        self.short_term.as_deref()
    }

    /// 显式推进长期目标：取队列中的下一个；队列耗尽则回到 NoGoal
    pub fn advance_long_term(&mut self) -> Option<&str> {
        match self.pending.pop_front() {
            Some(next) => {
                self.set_long_term(next);
                self.long_term.as_deref()
            }
            None => {
                self.clear_long_term();
                None
            }
        }
    }

    fn reset_long_term_progress(&mut self) {
        self.reset_short_term();
        self.substeps.clear();
        self.broken_down = false;
        self.splits = 0;
    }

    fn reset_short_term(&mut self) {
        self.short_term = None;
        self.locked_in = false;
        self.dispatch_attempts = 0;
    }
}

/// 目标策略：短期目标是否可提交（locked-in），以及提交后的完成判定
pub trait GoalPolicy: Send + Sync {
    fn is_committable(&self, goal: &str) -> bool;

    fn is_complete(&self, goal: &str, inventory: &BTreeMap<String, u32>) -> bool;
}

fn task_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // "Acquire wooden pickaxe (1)"
            Regex::new(
                r"(?i)^\s*(?:acquire|collect|gather|get|obtain|craft|mine|smelt|harvest)\s+(?:an?\s+)?(.+?)\s*\((\d+)\)\s*\.?$",
            )
            .expect("valid task pattern"),
            // "Mine 5 oak logs"
            Regex::new(
                r"(?i)^\s*(?:acquire|collect|gather|get|obtain|craft|mine|smelt|harvest)\s+(\d+)\s+(.+?)\s*\.?$",
            )
            .expect("valid task pattern"),
        ]
    })
}

/// 物品名规范化：小写、空格转下划线
pub fn normalize_item(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// 识别「获取 N 个 X」类任务，返回 (规范化物品名, 数量)
pub fn parse_task_pattern(goal: &str) -> Option<(String, u32)> {
    let [with_paren, with_count] = task_patterns();
    if let Some(c) = with_paren.captures(goal) {
        let count = c.get(2)?.as_str().parse().ok()?;
        return Some((normalize_item(c.get(1)?.as_str()), count));
    }
    let c = with_count.captures(goal)?;
    let count = c.get(1)?.as_str().parse().ok()?;
    Some((normalize_item(c.get(2)?.as_str()), count))
}

/// 默认策略：匹配已知任务模式即可提交；背包中该物品数量达到目标即完成
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskPatternPolicy;

impl GoalPolicy for TaskPatternPolicy {
    fn is_committable(&self, goal: &str) -> bool {
        parse_task_pattern(goal).is_some()
    }

    fn is_complete(&self, goal: &str, inventory: &BTreeMap<String, u32>) -> bool {
        let Some((item, count)) = parse_task_pattern(goal) else {
            return false;
        };
        let have = inventory.get(&item).copied().unwrap_or(0);
        // 复数形式（oak logs → oak_log）
        let singular = item.strip_suffix('s').and_then(|s| inventory.get(s)).copied().unwrap_or(0);
        have.max(singular) >= count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut goals = GoalStack::new();
        assert_eq!(goals.phase(), GoalPhase::NoGoal);
        goals.enqueue("build a house");
        assert_eq!(goals.advance_long_term(), Some("build a house"));
        assert_eq!(goals.phase(), GoalPhase::HasLongTermNoShortTerm);
        goals
            .set_substeps(vec!["Collect oak log (8)".into(), "Craft crafting table (1)".into()])
            .unwrap();
        assert_eq!(goals.phase(), GoalPhase::HasShortTerm);
        goals.lock_in().unwrap();
        assert_eq!(goals.phase(), GoalPhase::LockedIn);
        assert_eq!(goals.advance_short_term(), Some("Craft crafting table (1)"));
        assert_eq!(goals.phase(), GoalPhase::HasShortTerm);
        assert_eq!(goals.advance_short_term(), None);
        assert_eq!(goals.phase(), GoalPhase::HasLongTermNoShortTerm);
        assert_eq!(goals.advance_long_term(), None);
        assert_eq!(goals.phase(), GoalPhase::NoGoal);
    }

    #[test]
    fn test_short_term_requires_long_term() {
        let mut goals = GoalStack::new();
        assert!(goals.set_short_term("mine").is_err());
        assert!(goals.short_term().is_none());
    }

    #[test]
    fn test_clear_long_term_clears_short_term_atomically() {
        let mut goals = GoalStack::new();
        goals.set_long_term("survive");
        goals.set_short_term("Collect oak log (4)").unwrap();
        goals.lock_in().unwrap();
        goals.clear_long_term();
        assert!(goals.short_term().is_none());
        assert!(!goals.is_locked_in());
        assert_eq!(goals.phase(), GoalPhase::NoGoal);
    }

    #[test]
    fn test_split_short_term_keeps_order() {
        let mut goals = GoalStack::new();
        goals.set_long_term("tools");
        goals.set_substeps(vec!["a".into(), "d".into()]).unwrap();
        assert!(goals.is_broken_down());
        goals.split_short_term(vec!["b".into(), "c".into()]).unwrap();
        assert_eq!(goals.splits(), 1);
        assert_eq!(goals.short_term(), Some("b"));
        assert_eq!(goals.substeps().collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[test]
    fn test_task_pattern_policy() {
        let policy = TaskPatternPolicy;
        assert!(policy.is_committable("Acquire wooden pickaxe (1)"));
        assert!(policy.is_committable("Mine 5 oak logs"));
        assert!(!policy.is_committable("explore the cave"));

        let mut inv = BTreeMap::new();
        assert!(!policy.is_complete("Acquire wooden pickaxe (1)", &inv));
        inv.insert("wooden_pickaxe".to_string(), 1);
        assert!(policy.is_complete("Acquire wooden pickaxe (1)", &inv));
        inv.insert("oak_log".to_string(), 5);
        assert!(policy.is_complete("Mine 5 oak logs", &inv));
    }
}
