//! Agent 装配
//!
//! 从配置构建一个 Agent 实例：共享状态（含事件日志与记忆）、推理器、Planner、原语执行器、
//! 恢复引擎、认知控制器。每个 Agent 拥有独立的状态；多个 Agent 之间只通过 AgentHub 的信箱通信。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::actions::{ActionExecutor, RecipeBook};
use crate::config::AppConfig;
use crate::core::{
    AgentError, AgentState, CognitiveController, EventLog, EventRole, GoalExecutor, Mailbox, RecoveryEngine,
};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient};
use crate::memory::{MemoryStore, Message};
use crate::planning::{build_goal_tree, TaskNode, Traversal};
use crate::react::{dispatch, DispatchEvent, DispatchOutcome, DispatchSession, Planner, DEFAULT_SYSTEM_PROMPT};
use crate::world::{refresh_all, Actions, Perception, SimWorld};

/// 根据配置与环境变量选择推理后端，并包上有限重试
///
/// 有 DEEPSEEK_API_KEY（或 provider=deepseek 且只有 OPENAI_API_KEY）时走 DeepSeek 兼容端点；
/// 有 OPENAI_API_KEY 且 provider 不是 deepseek 时走 OpenAI；都没有则使用 mock。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();
    let timeout = std::time::Duration::from_secs(cfg.llm.request_timeout_secs.max(1));

    let base: Arc<dyn LlmClient> = if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient);
    } else if has_deepseek || (provider == "deepseek" && has_openai) {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::deepseek(Some(&cfg.llm.model)).with_timeout(timeout))
    } else if has_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None).with_timeout(timeout))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        return Arc::new(MockLlmClient);
    };
    Arc::new(RetryingLlmClient::new(base, cfg.llm.retry()))
}

fn load_system_prompt(cfg: &AppConfig) -> String {
    let Some(path) = &cfg.agent.system_prompt_path else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "system prompt unreadable ({}), using default", e);
        DEFAULT_SYSTEM_PROMPT.to_string()
    })
}

/// 一次调度所需的全部组件；也是控制器的 GoalExecutor
pub struct AgentCore {
    pub state: Arc<AgentState>,
    pub planner: Planner,
    pub executor: Arc<ActionExecutor>,
    pub perception: Arc<dyn Perception>,
    pub recovery: RecoveryEngine,
    pub max_rounds: usize,
}

impl AgentCore {
    /// 对一条指令运行调度循环
    pub async fn dispatch(
        &self,
        instruction: &str,
        event_tx: Option<&mpsc::UnboundedSender<DispatchEvent>>,
    ) -> Result<DispatchOutcome, AgentError> {
        self.state.log(EventRole::User, instruction);
        if let Err(e) = refresh_all(&self.state, self.perception.as_ref()).await {
            tracing::warn!("perception refresh before dispatch failed: {}", e);
        }
        let mut session = DispatchSession::new(
            &self.planner,
            &self.executor,
            self.perception.as_ref(),
            &self.recovery,
        )
        .with_max_rounds(self.max_rounds);
        if let Some(tx) = event_tx {
            session = session.with_event_tx(tx);
        }
        let initial = vec![
            Message::user(self.state.render_summary()),
            Message::user(instruction),
        ];
        dispatch(&session, initial).await
    }
}

#[async_trait]
impl GoalExecutor for AgentCore {
    async fn execute_goal(&self, goal: &str) -> Result<String, AgentError> {
        let outcome = self.dispatch(&format!("Your current task: {goal}"), None).await?;
        Ok(outcome.response)
    }
}

/// 一个完整的 Agent 实例
pub struct Agent {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    core: Arc<AgentCore>,
    controller: CognitiveController,
}

impl Agent {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        perception: Arc<dyn Perception>,
        actions: Arc<dyn Actions>,
        knowledge: Arc<RecipeBook>,
    ) -> Result<Self, AgentError> {
        let events = match &config.event_log.path {
            Some(path) => EventLog::with_file(path)
                .map_err(|e| AgentError::ConfigError(format!("event log {}: {e}", path.display())))?,
            None => EventLog::new(),
        };
        let memory = MemoryStore::new(config.memory.short_term_capacity);
        let state = Arc::new(AgentState::with_parts(config.agent.name.clone(), memory, events));

        let executor = Arc::new(ActionExecutor::new(actions, state.clone(), config.actions.executor()));
        let core = Arc::new(AgentCore {
            state: state.clone(),
            planner: Planner::new(llm.clone(), load_system_prompt(&config)),
            executor: executor.clone(),
            perception: perception.clone(),
            recovery: RecoveryEngine::new(knowledge),
            max_rounds: config.dispatch.max_rounds,
        });
        let controller = CognitiveController::new(
            state.clone(),
            perception,
            llm.clone(),
            core.clone(),
            config.controller.clone(),
        )
        .with_defender(executor);

        state.log_with(
            EventRole::System,
            format!("agent {} assembled", config.agent.name),
            serde_json::json!({
                "max_rounds": config.dispatch.max_rounds,
                "traversal": config.planning.traversal().to_string(),
            }),
        );
        Ok(Self {
            config,
            llm,
            core,
            controller,
        })
    }

    /// 离线模式：内存模拟世界 + 配置选择的推理器
    pub fn offline(config: AppConfig) -> Result<(Self, Arc<SimWorld>), AgentError> {
        let world = Arc::new(SimWorld::standard());
        let knowledge = Arc::new(world.recipes().clone());
        let llm = create_llm_from_config(&config);
        let agent = Self::new(config, llm, world.clone(), world.clone(), knowledge)?;
        Ok((agent, world))
    }

    /// 接入消息中枢的信箱（须在 start 之前）
    pub fn with_mailbox(mut self, mailbox: Mailbox) -> Self {
        self.controller = self.controller.clone().with_mailbox(mailbox);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.core.state
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn core(&self) -> &Arc<AgentCore> {
        &self.core
    }

    pub fn controller(&self) -> &CognitiveController {
        &self.controller
    }

    /// 对单条指令运行调度循环
    pub async fn run_instruction(
        &self,
        instruction: &str,
        event_tx: Option<&mpsc::UnboundedSender<DispatchEvent>>,
    ) -> Result<DispatchOutcome, AgentError> {
        self.core.dispatch(instruction, event_tx).await
    }

    /// 为目标构建任务树；mode 为 None 时使用配置的遍历方式
    pub async fn plan<F>(&self, goal: &str, mode: Option<Traversal>, on_progress: F) -> Result<Vec<TaskNode>, AgentError>
    where
        F: FnMut(&[TaskNode]),
    {
        if let Err(e) = refresh_all(&self.core.state, self.core.perception.as_ref()).await {
            tracing::warn!("perception refresh before planning failed: {}", e);
        }
        let mode = mode.unwrap_or_else(|| self.config.planning.traversal());
        build_goal_tree(
            self.llm.as_ref(),
            goal,
            mode,
            on_progress,
            &self.core.state.ambient(),
            self.config.planning.limits(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn offline_with(llm: ScriptedLlmClient) -> (Agent, Arc<SimWorld>) {
        let world = Arc::new(SimWorld::standard());
        let knowledge = Arc::new(world.recipes().clone());
        let agent = Agent::new(AppConfig::default(), Arc::new(llm), world.clone(), world.clone(), knowledge).unwrap();
        (agent, world)
    }

    #[tokio::test]
    async fn test_instruction_runs_primitives_against_world() {
        let llm = ScriptedLlmClient::new([
            r#"{"tool": "mine", "args": {"block": "oak_log", "count": 2}}"#,
            "Collected two logs.",
        ]);
        let (agent, world) = offline_with(llm);
        let outcome = agent.run_instruction("get two logs", None).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.response, "Collected two logs.");
        assert_eq!(world.count("oak_log"), 2);
        assert!(agent.state().inventory().iter().any(|l| l == "oak_log:2"));
    }

    #[tokio::test]
    async fn test_goal_executor_returns_final_text() {
        let (agent, _) = offline_with(ScriptedLlmClient::new(["Nothing to do."]));
        let text = agent.core().execute_goal("wave at the player").await.unwrap();
        assert_eq!(text, "Nothing to do.");
    }

    #[tokio::test]
    async fn test_event_log_path_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.event_log.path = Some(dir.path().join("events.jsonl"));
        let world = Arc::new(SimWorld::standard());
        let agent = Agent::new(
            config,
            Arc::new(MockLlmClient),
            world.clone(),
            world.clone(),
            Arc::new(RecipeBook::standard()),
        )
        .unwrap();
        agent.state().log(EventRole::System, "hello");
        let records = crate::core::load_jsonl(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(records.len(), 2);
    }
}
