//! 原语执行器
//!
//! 持有行动协作者与执行参数，execute(call) 在超时内调用对应原语：
//! 只有寻路超时（以及移动类原语的执行超时）会按固定退避重试有限次，其余失败第一次就返回；
//! 执行期间把调用登记到共享状态的待执行列表，结束后写一条 action 事件；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::actions::PrimitiveCall;
use crate::core::{ActionError, AgentState, EventRole};
use crate::world::Actions;

/// 执行参数
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// 单次调用超时
    pub timeout: Duration,
    /// 寻路超时的额外重试次数
    pub pathfind_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            pathfind_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// 原语执行器：超时 + 寻路重试 + 审计
pub struct ActionExecutor {
    actions: Arc<dyn Actions>,
    state: Arc<AgentState>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(actions: Arc<dyn Actions>, state: Arc<AgentState>, config: ExecutorConfig) -> Self {
        Self {
            actions,
            state,
            config,
        }
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.state
    }

    /// 执行一个原语调用
    pub async fn execute(&self, call: &PrimitiveCall) -> Result<String, ActionError> {
        let signature = call.signature();
        let primitive = call.primitive();
        let start = Instant::now();
        self.state.add_pending_action(signature.clone());

        let mut attempts = 0u32;
        let result = loop {
            attempts += 1;
            let outcome = match timeout(self.config.timeout, call.invoke(self.actions.as_ref())).await {
                Ok(result) => result,
                Err(_) if primitive.is_movement() => Err(ActionError::PathfindTimeout(format!(
                    "{signature} did not finish within {}s",
                    self.config.timeout.as_secs_f32()
                ))),
                Err(_) => Err(ActionError::failed(format!(
                    "{signature} timed out after {}s",
                    self.config.timeout.as_secs_f32()
                ))),
            };
            match outcome {
                Err(e) if e.is_timeout() && attempts <= self.config.pathfind_retries => {
                    tracing::debug!(tool = %primitive, attempt = attempts, "pathfinding timed out, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                other => break other,
            }
        };

        self.state.complete_pending_action(&signature);

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(e) if e.is_timeout() => (false, "timeout"),
            Err(_) => (false, "error"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "action_audit",
            "tool": primitive.name(),
            "ok": ok,
            "outcome": outcome,
            "attempts": attempts,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&signature),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        let content = match &result {
            Ok(text) => format!("{signature} -> {text}"),
            Err(e) => format!("{signature} failed: {e}"),
        };
        self.state.log_with(EventRole::Action, content, audit);
        result
    }
}

fn args_preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimWorld;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_secs(5),
            pathfind_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_pathfind_timeout_is_retried_then_succeeds() {
        let world = Arc::new(SimWorld::standard());
        world.fail_pathfinding(2);
        let state = Arc::new(AgentState::new("bot"));
        let executor = ActionExecutor::new(world.clone(), state.clone(), fast_config());

        let call = PrimitiveCall::Mine { block: "oak_log".into(), count: 2 };
        let out = executor.execute(&call).await.unwrap();
        assert!(out.contains("oak_log"));
        assert_eq!(world.count("oak_log"), 2);
        assert!(state.pending_actions().is_empty());
        let last = state.events().last().unwrap();
        assert_eq!(last.role, EventRole::Action);
        assert_eq!(last.metadata.unwrap()["attempts"], 3);
    }

    #[tokio::test]
    async fn test_pathfind_retries_exhausted() {
        let world = Arc::new(SimWorld::standard());
        world.fail_pathfinding(5);
        let state = Arc::new(AgentState::new("bot"));
        let executor = ActionExecutor::new(world, state, fast_config());

        let err = executor
            .execute(&PrimitiveCall::Mine { block: "oak_log".into(), count: 1 })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let world = Arc::new(SimWorld::standard());
        let state = Arc::new(AgentState::new("bot"));
        let executor = ActionExecutor::new(world, state.clone(), fast_config());

        let err = executor
            .execute(&PrimitiveCall::Craft { item: "stick".into(), amount: 1 })
            .await
            .unwrap_err();
        assert!(err.is_missing_prerequisite());
        let meta = state.events().last().unwrap().metadata.unwrap();
        assert_eq!(meta["attempts"], 1);
        assert_eq!(meta["ok"], false);
    }
}
