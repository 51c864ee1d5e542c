//! 认知控制器：快慢两个周期循环共享同一个 AgentState
//!
//! - 快循环：只刷新附近敌对生物与威胁，决定是否标记防御（可选自动反击），不做规划
//! - 慢循环：刷新更广的感知、清空信箱并更新社交账本，然后推进目标状态机一步
//!
//! 目标状态机：NoGoal → HasLongTermNoShortTerm → HasShortTerm → LockedIn。
//! LockedIn 期间慢循环只做完成判定，并把短期目标交给调度循环（后台任务，至多 max_dispatch_attempts 次）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::actions::{ActionExecutor, PrimitiveCall};
use crate::core::event_log::EventRole;
use crate::core::goals::{GoalPhase, GoalPolicy, TaskPatternPolicy};
use crate::core::hub::Mailbox;
use crate::core::session_supervisor::SessionSupervisor;
use crate::core::state::{AgentState, SentimentDirection};
use crate::core::task_scheduler::{PeriodicTask, TickStats};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::planning::breakdown;
use crate::world::{refresh_all, refresh_hostiles, refresh_status, Perception, ScanWorker};

/// 控制器参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub fast_period_ms: u64,
    pub slow_period_ms: u64,
    /// 0 表示不启动独立扫描 worker，由慢循环做完整刷新
    pub scan_period_ms: u64,
    /// 敌对生物进入此距离即标记防御
    pub danger_radius: f32,
    /// 标记防御时是否直接发起 attack
    pub auto_defend: bool,
    /// 一个已提交的短期目标最多交给调度循环的次数
    pub max_dispatch_attempts: u32,
    /// 每个长期目标下短期目标最多再拆分的次数
    pub max_splits: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fast_period_ms: 1000,
            slow_period_ms: 5000,
            scan_period_ms: 0,
            danger_radius: 8.0,
            auto_defend: false,
            max_dispatch_attempts: 2,
            max_splits: 4,
        }
    }
}

impl ControllerConfig {
    pub fn fast_period(&self) -> Duration {
        Duration::from_millis(self.fast_period_ms.max(1))
    }

    pub fn slow_period(&self) -> Duration {
        Duration::from_millis(self.slow_period_ms.max(1))
    }
}

/// 把一个已提交的短期目标交给执行方（通常是调度循环），返回最终文本
#[async_trait]
pub trait GoalExecutor: Send + Sync {
    async fn execute_goal(&self, goal: &str) -> Result<String, AgentError>;
}

struct ControllerInner {
    state: Arc<AgentState>,
    perception: Arc<dyn Perception>,
    llm: Arc<dyn LlmClient>,
    goal_executor: Arc<dyn GoalExecutor>,
    /// 克隆出的句柄共享同一个槽位，替换对所有句柄生效
    policy: RwLock<Arc<dyn GoalPolicy>>,
    defender: RwLock<Option<Arc<ActionExecutor>>>,
    mailbox: Mutex<Option<Mailbox>>,
    config: ControllerConfig,
    supervisor: SessionSupervisor,
    /// 扫描 worker 在运行时慢循环只刷新状态类感知
    scan_attached: AtomicBool,
    executing: AtomicBool,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

/// 认知控制器
#[derive(Clone)]
pub struct CognitiveController {
    inner: Arc<ControllerInner>,
}

/// 运行中的控制器循环
pub struct ControllerHandle {
    fast: PeriodicTask,
    slow: PeriodicTask,
    scan: Option<ScanWorker>,
    supervisor: SessionSupervisor,
    controller: CognitiveController,
}

impl ControllerHandle {
    pub fn fast_stats(&self) -> Arc<TickStats> {
        self.fast.stats()
    }

    pub fn slow_stats(&self) -> Arc<TickStats> {
        self.slow.stats()
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// 停止所有触发器；正在进行的调度不会被打断
    pub async fn stop(self) {
        self.supervisor.stop("controller stop requested");
        self.fast.stop().await;
        self.slow.stop().await;
        if let Some(scan) = self.scan {
            let scans = scan.stop().await;
            tracing::debug!(scans, "scan worker stopped");
        }
        self.controller.inner.scan_attached.store(false, Ordering::Release);
    }
}

impl CognitiveController {
    pub fn new(
        state: Arc<AgentState>,
        perception: Arc<dyn Perception>,
        llm: Arc<dyn LlmClient>,
        goal_executor: Arc<dyn GoalExecutor>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state,
                perception,
                llm,
                goal_executor,
                policy: RwLock::new(Arc::new(TaskPatternPolicy)),
                defender: RwLock::new(None),
                mailbox: Mutex::new(None),
                config,
                supervisor: SessionSupervisor::new(),
                scan_attached: AtomicBool::new(false),
                executing: AtomicBool::new(false),
                dispatch_task: Mutex::new(None),
            }),
        }
    }

    /// 替换目标策略；下一次慢循环起生效
    pub fn with_policy(self, policy: Arc<dyn GoalPolicy>) -> Self {
        *self.inner.policy.write().unwrap_or_else(|e| e.into_inner()) = policy;
        self
    }

    /// 自动反击使用的执行器
    pub fn with_defender(self, executor: Arc<ActionExecutor>) -> Self {
        *self.inner.defender.write().unwrap_or_else(|e| e.into_inner()) = Some(executor);
        self
    }

    pub fn with_mailbox(self, mailbox: Mailbox) -> Self {
        *self.lock_mailbox() = Some(mailbox);
        self
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.inner.state
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.inner.supervisor
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::Acquire)
    }

    fn policy(&self) -> Arc<dyn GoalPolicy> {
        self.inner.policy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn defender(&self) -> Option<Arc<ActionExecutor>> {
        self.inner.defender.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_mailbox(&self) -> std::sync::MutexGuard<'_, Option<Mailbox>> {
        self.inner.mailbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 启动快、慢循环（以及可选的扫描 worker）
    pub fn start(&self) -> ControllerHandle {
        let supervisor = self.inner.supervisor.clone();
        let config = &self.inner.config;

        let scan = (config.scan_period_ms > 0).then(|| {
            self.inner.scan_attached.store(true, Ordering::Release);
            ScanWorker::spawn_with_token(
                self.inner.state.clone(),
                self.inner.perception.clone(),
                Duration::from_millis(config.scan_period_ms),
                supervisor.loop_token("scan"),
            )
        });

        let fast_ctl = self.clone();
        let fast = PeriodicTask::spawn("fast", config.fast_period(), supervisor.loop_token("fast"), move |_| {
            let ctl = fast_ctl.clone();
            Box::pin(async move { ctl.fast_tick().await })
        });
        let slow_ctl = self.clone();
        let slow = PeriodicTask::spawn("slow", config.slow_period(), supervisor.loop_token("slow"), move |_| {
            let ctl = slow_ctl.clone();
            Box::pin(async move { ctl.slow_tick().await })
        });

        tracing::info!(
            agent = %self.inner.state.name(),
            fast_ms = config.fast_period_ms,
            slow_ms = config.slow_period_ms,
            scan = scan.is_some(),
            "cognitive controller started"
        );
        self.inner.state.log(EventRole::System, "controller started");

        ControllerHandle {
            fast,
            slow,
            scan,
            supervisor,
            controller: self.clone(),
        }
    }

    // ── 快循环 ───────────────────────────────────────────────────────────

    pub async fn fast_tick(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        let hostiles = refresh_hostiles(&inner.state, inner.perception.as_ref()).await?;
        let threat = inner.perception.check_threat().await?;

        let nearest = hostiles
            .iter()
            .find(|m| m.distance <= inner.config.danger_radius)
            .map(|m| m.name.clone());
        let target = if threat.under_attack {
            threat.attacker.clone().or(nearest)
        } else {
            nearest
        };

        let Some(target) = target else {
            if let Some(previous) = inner.state.clear_defense() {
                inner.state.log(EventRole::Reflex, format!("threat from {previous} cleared"));
            }
            return Ok(());
        };

        if inner.state.defense_target().as_deref() != Some(target.as_str()) {
            tracing::info!(target = %target, under_attack = threat.under_attack, "defense flagged");
            inner.state.flag_defense(&target);
            inner.state.log_with(
                EventRole::Reflex,
                format!("defending against {target}"),
                serde_json::json!({ "under_attack": threat.under_attack, "message": threat.message }),
            );
        }

        if inner.config.auto_defend {
            if let Some(defender) = self.defender() {
                defender
                    .execute(&PrimitiveCall::Attack { mob_type: target })
                    .await?;
            }
        }
        Ok(())
    }

    // ── 慢循环 ───────────────────────────────────────────────────────────

    pub async fn slow_tick(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        if inner.scan_attached.load(Ordering::Acquire) {
            refresh_status(&inner.state, inner.perception.as_ref()).await?;
        } else {
            refresh_all(&inner.state, inner.perception.as_ref()).await?;
        }

        self.drain_mailbox();
        self.note_nearby_players();

        if inner.supervisor.is_paused().await {
            tracing::debug!("goal machine paused");
            return Ok(());
        }
        self.step_goal_machine().await
    }

    /// 信箱 → 事件日志 + 社交账本
    fn drain_mailbox(&self) -> usize {
        let messages = match self.lock_mailbox().as_mut() {
            Some(mailbox) => mailbox.drain(),
            None => return 0,
        };
        let state = &self.inner.state;
        for msg in &messages {
            state.log_with(
                EventRole::Message,
                msg.content.clone(),
                serde_json::json!({ "from": msg.from, "sent_at": msg.sent_at }),
            );
            let delta = message_tone(&msg.content);
            state.update_sentiment(&msg.from, SentimentDirection::Incoming, delta, format!("said: {}", msg.content));
        }
        messages.len()
    }

    /// 第一次出现在附近的玩家进入社交账本（中性分），返回新增人数
    fn note_nearby_players(&self) -> usize {
        let state = &self.inner.state;
        let mut added = 0;
        for player in state.perception().players {
            if player == state.name()
                || state.sentiment(&player, SentimentDirection::Outgoing).is_some()
                || state.sentiment(&player, SentimentDirection::Incoming).is_some()
            {
                continue;
            }
            tracing::debug!(player = %player, "new player nearby");
            state.update_sentiment(&player, SentimentDirection::Outgoing, 0, "seen nearby");
            added += 1;
        }
        added
    }

    /// 推进目标状态机一步
    pub async fn step_goal_machine(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        let state = &inner.state;
        let goals = state.goals();

        match goals.phase() {
            GoalPhase::NoGoal => {
                let next = state.with_goals(|g| g.advance_long_term().map(str::to_string));
                if let Some(goal) = next {
                    tracing::info!(goal = %goal, "long-term goal adopted");
                    state.log(EventRole::Goal, format!("long-term goal: {goal}"));
                }
            }
            GoalPhase::HasLongTermNoShortTerm => {
                let Some(long_term) = goals.long_term().map(str::to_string) else {
                    return Ok(());
                };
                if goals.is_broken_down() {
                    state.log(EventRole::Goal, format!("long-term goal finished: {long_term}"));
                    let next = state.with_goals(|g| g.advance_long_term().map(str::to_string));
                    tracing::info!(finished = %long_term, next = ?next, "long-term goal advanced");
                    if let Some(goal) = next {
                        state.log(EventRole::Goal, format!("long-term goal: {goal}"));
                    }
                    return Ok(());
                }

                let mut steps = breakdown(inner.llm.as_ref(), &long_term, &state.ambient()).await?;
                if steps.is_empty() {
                    steps.push(long_term.clone());
                }
                let applied = state.with_goals(|g| {
                    if g.long_term() != Some(long_term.as_str()) {
                        return Ok(false);
                    }
                    g.set_substeps(steps.clone()).map(|_| true)
                })?;
                if applied {
                    state.log_with(
                        EventRole::Goal,
                        format!("short-term goal: {}", steps[0]),
                        serde_json::json!({ "long_term": long_term, "substeps": steps }),
                    );
                }
            }
            GoalPhase::HasShortTerm => {
                let Some(short_term) = goals.short_term().map(str::to_string) else {
                    return Ok(());
                };
                if self.policy().is_complete(&short_term, &state.inventory_counts()) {
                    state.log(EventRole::Goal, format!("already satisfied: {short_term}"));
                    self.advance_short_term();
                    return Ok(());
                }
                if self.policy().is_committable(&short_term) {
                    state.with_goals(|g| g.lock_in())?;
                    tracing::info!(goal = %short_term, "short-term goal locked in");
                    state.log(EventRole::Goal, format!("locked in: {short_term}"));
                    return Ok(());
                }

                let steps = if goals.splits() < inner.config.max_splits {
                    breakdown(inner.llm.as_ref(), &short_term, &state.ambient()).await?
                } else {
                    Vec::new()
                };
                if steps.is_empty() {
                    tracing::warn!(goal = %short_term, "short-term goal cannot be committed or split, dropped");
                    state.log(EventRole::Goal, format!("dropped: {short_term}"));
                    self.advance_short_term();
                    return Ok(());
                }
                let applied = state.with_goals(|g| {
                    if g.short_term() != Some(short_term.as_str()) {
                        return Ok(false);
                    }
                    g.split_short_term(steps.clone()).map(|_| true)
                })?;
                if applied {
                    state.log(EventRole::Goal, format!("split \"{short_term}\" into {}", steps.join("; ")));
                }
            }
            GoalPhase::LockedIn => {
                let Some(short_term) = goals.short_term().map(str::to_string) else {
                    return Ok(());
                };
                if self.policy().is_complete(&short_term, &state.inventory_counts()) {
                    tracing::info!(goal = %short_term, "short-term goal completed");
                    state.log(EventRole::Goal, format!("completed: {short_term}"));
                    self.advance_short_term();
                    return Ok(());
                }
                if self.is_executing() {
                    return Ok(());
                }
                if goals.dispatch_attempts() >= inner.config.max_dispatch_attempts {
                    tracing::warn!(
                        goal = %short_term,
                        attempts = goals.dispatch_attempts(),
                        "short-term goal abandoned"
                    );
                    state.log(EventRole::Goal, format!("abandoned: {short_term}"));
                    self.advance_short_term();
                    return Ok(());
                }
                let attempt = state.with_goals(|g| g.record_dispatch_attempt());
                self.spawn_dispatch(short_term, attempt);
            }
        }
        Ok(())
    }

    fn advance_short_term(&self) {
        let next = self
            .inner
            .state
            .with_goals(|g| g.advance_short_term().map(str::to_string));
        if let Some(goal) = next {
            self.inner.state.log(EventRole::Goal, format!("short-term goal: {goal}"));
        }
    }

    fn spawn_dispatch(&self, goal: String, attempt: u32) {
        let inner = self.inner.clone();
        inner.executing.store(true, Ordering::Release);
        tracing::info!(goal = %goal, attempt, "dispatching short-term goal");
        let handle = tokio::spawn({
            let inner = inner.clone();
            async move {
                match inner.goal_executor.execute_goal(&goal).await {
                    Ok(text) => {
                        inner.state.log_with(
                            EventRole::Assistant,
                            text,
                            serde_json::json!({ "goal": goal, "attempt": attempt }),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(goal = %goal, attempt, "dispatch failed: {}", e);
                        inner.state.log(EventRole::System, format!("dispatch for \"{goal}\" failed: {e}"));
                    }
                }
                inner.executing.store(false, Ordering::Release);
            }
        });
        *inner.dispatch_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// 等待进行中的调度结束（没有则立即返回）
    pub async fn wait_for_dispatch(&self) {
        let handle = self
            .inner
            .dispatch_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("dispatch task panicked: {}", e);
                self.inner.executing.store(false, Ordering::Release);
            }
        }
    }
}

/// 极简的语气打分：礼貌 +1，敌意 -1，其余 0
fn message_tone(text: &str) -> i32 {
    const FRIENDLY: &[&str] = &["thanks", "thank you", "please", "gift", "help", "friend"];
    const HOSTILE: &[&str] = &["hate", "stupid", "go away", "kill you", "thief", "idiot"];
    let lower = text.to_lowercase();
    let friendly = FRIENDLY.iter().any(|w| lower.contains(w));
    let hostile = HOSTILE.iter().any(|w| lower.contains(w));
    match (friendly, hostile) {
        (true, false) => 1,
        (false, true) => -1,
        _ => 0,
    }
}
