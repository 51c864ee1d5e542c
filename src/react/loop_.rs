//! 调度主循环
//!
//! 每轮：检查中断（正在被攻击则先注入一条高优先级消息）-> 带原语菜单请求推理器 ->
//! 没有调用则以回复文本结束；否则按顺序处理每个调用（解析参数、执行原语），
//! 失败一律转成诊断写回 transcript，缺材料类失败附带配方提示 -> 写回最新状态摘要 -> 下一轮。
//! 只有推理服务失败会中止；轮数用尽返回固定的兜底文本。

use std::collections::BTreeMap;

use crate::actions::{ActionExecutor, PrimitiveCall};
use crate::core::{AgentError, EventRole, RecoveryAction, RecoveryEngine};
use crate::llm::Invocation;
use crate::memory::Message;
use crate::react::{DispatchEvent, Planner};
use crate::world::{refresh_status, Perception};

/// 单次调度最大轮数，防止死循环
pub const MAX_DISPATCH_ROUNDS: usize = 20;
/// 轮数用尽时的返回文本
pub const FALLBACK_RESPONSE: &str = "I stopped before finishing: the step limit for this instruction was reached.";
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 调度结果：最终回复与完整 transcript
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: String,
    pub rounds: usize,
    pub transcript: Vec<Message>,
    /// 推理器主动结束（false 表示轮数用尽）
    pub completed: bool,
    /// 写回的诊断条数
    pub diagnostics: usize,
}

/// 调度会话配置
pub struct DispatchSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ActionExecutor,
    /// 中断谓词与状态刷新
    pub perception: &'a dyn Perception,
    pub recovery: &'a RecoveryEngine,
    pub max_rounds: usize,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a tokio::sync::mpsc::UnboundedSender<DispatchEvent>>,
}

impl<'a> DispatchSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ActionExecutor,
        perception: &'a dyn Perception,
        recovery: &'a RecoveryEngine,
    ) -> Self {
        Self {
            planner,
            executor,
            perception,
            recovery,
            max_rounds: MAX_DISPATCH_ROUNDS,
            event_tx: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a tokio::sync::mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: DispatchEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// assistant 消息：回复文本 + 调用的 JSON 形式
fn render_assistant_turn(text: &str, invocations: &[Invocation]) -> String {
    let mut out = text.to_string();
    for inv in invocations {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "{{\"tool\": \"{}\", \"args\": {}}}",
            inv.name,
            if inv.arguments.trim().is_empty() {
                "{}"
            } else {
                inv.arguments.as_str()
            }
        ));
    }
    out
}

fn render_recovery(action: RecoveryAction, fallback: &AgentError) -> String {
    match action {
        RecoveryAction::Diagnose(diagnostic) => diagnostic,
        RecoveryAction::DiagnoseWithHint { diagnostic, hint } => format!("{diagnostic}\n{hint}"),
        RecoveryAction::Abort => format!("Error: {fallback}"),
    }
}

/// 处理一个调用，返回写回 transcript 的文本与是否为诊断
async fn handle_invocation(
    session: &DispatchSession<'_>,
    inv: &Invocation,
    inventory: &BTreeMap<String, u32>,
) -> (String, bool) {
    session.send(DispatchEvent::Invocation {
        tool: inv.name.clone(),
        args: inv.arguments.clone(),
    });

    let call = match PrimitiveCall::parse(&inv.name, &inv.arguments) {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(tool = %inv.name, "invocation rejected: {}", e);
            let text = render_recovery(session.recovery.handle(&e, None, inventory), &e);
            session.send(DispatchEvent::Diagnostic {
                tool: inv.name.clone(),
                text: text.clone(),
            });
            return (text, true);
        }
    };

    match session.executor.execute(&call).await {
        Ok(result) => {
            session.send(DispatchEvent::Observation {
                tool: inv.name.clone(),
                preview: preview(&result),
            });
            (format!("{}: {}", call.signature(), result), false)
        }
        Err(source) => {
            let err = AgentError::ActionFailed {
                tool: inv.name.clone(),
                source,
            };
            let target = call.yields().map(|(item, _)| item);
            let text = render_recovery(session.recovery.handle(&err, target, inventory), &err);
            session.send(DispatchEvent::Diagnostic {
                tool: inv.name.clone(),
                text: text.clone(),
            });
            (text, true)
        }
    }
}

/// 执行调度循环
pub async fn dispatch(
    session: &DispatchSession<'_>,
    initial_messages: Vec<Message>,
) -> Result<DispatchOutcome, AgentError> {
    let state = session.executor.state();
    let mut transcript = initial_messages;
    let mut diagnostics = 0usize;

    for round in 1..=session.max_rounds {
        session.send(DispatchEvent::RoundStarted {
            round,
            max_rounds: session.max_rounds,
        });

        match session.perception.check_threat().await {
            Ok(threat) if threat.under_attack => {
                let attacker = threat.attacker.as_deref().unwrap_or("something");
                let message = format!(
                    "URGENT: you are under attack by {attacker}. {} Deal with this threat before continuing.",
                    threat.message
                );
                tracing::info!(round, attacker, "threat injected into dispatch");
                state.log(EventRole::Reflex, message.clone());
                session.send(DispatchEvent::Interrupt {
                    message: message.clone(),
                });
                transcript.push(Message::user(message));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(round, "threat check failed: {}", e),
        }

        session.send(DispatchEvent::Thinking);
        let reply = match session.planner.decide(&transcript).await {
            Ok(reply) => reply,
            Err(e) => {
                session.send(DispatchEvent::Error { text: e.to_string() });
                tracing::error!(round, "reasoner failed, aborting dispatch: {}", e);
                return Err(AgentError::Reasoner(e));
            }
        };

        if reply.invocations.is_empty() {
            state.log(EventRole::Assistant, reply.text.clone());
            transcript.push(Message::assistant(reply.text.clone()));
            session.send(DispatchEvent::Finished {
                response: reply.text.clone(),
                rounds: round,
            });
            return Ok(DispatchOutcome {
                response: reply.text,
                rounds: round,
                transcript,
                completed: true,
                diagnostics,
            });
        }

        let assistant_turn = render_assistant_turn(&reply.text, &reply.invocations);
        state.log(EventRole::Assistant, assistant_turn.clone());
        transcript.push(Message::assistant(assistant_turn));

        for inv in &reply.invocations {
            let inventory = state.inventory_counts();
            let (text, is_diagnostic) = handle_invocation(session, inv, &inventory).await;
            if is_diagnostic {
                diagnostics += 1;
            } else {
                // 同一轮后续调用的提示要基于执行后的背包
                match session.perception.scan_inventory().await {
                    Ok(lines) => state.set_inventory(lines),
                    Err(e) => tracing::warn!(round, "inventory rescan failed: {}", e),
                }
            }
            state.log(EventRole::Tool, text.clone());
            transcript.push(Message::tool(text));
        }

        if let Err(e) = refresh_status(state, session.perception).await {
            tracing::warn!(round, "state refresh failed: {}", e);
        }
        transcript.push(Message::user(state.render_summary()));
    }

    tracing::warn!(rounds = session.max_rounds, "dispatch round limit reached");
    session.send(DispatchEvent::RoundLimit {
        rounds: session.max_rounds,
    });
    state.log(EventRole::Assistant, FALLBACK_RESPONSE);
    Ok(DispatchOutcome {
        response: FALLBACK_RESPONSE.to_string(),
        rounds: session.max_rounds,
        transcript,
        completed: false,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::actions::ExecutorConfig;
    use crate::core::AgentState;
    use crate::llm::ScriptedLlmClient;
    use crate::world::SimWorld;

    #[test]
    fn test_render_assistant_turn() {
        let invs = vec![Invocation {
            id: "call_0".into(),
            name: "sortInventory".into(),
            arguments: String::new(),
        }];
        assert_eq!(
            render_assistant_turn("tidying", &invs),
            "tidying\n{\"tool\": \"sortInventory\", \"args\": {}}"
        );
    }

    #[tokio::test]
    async fn test_missing_ingredient_diagnostic_carries_hint() {
        let world = Arc::new(SimWorld::standard());
        let state = Arc::new(AgentState::new("bot"));
        let llm = Arc::new(ScriptedLlmClient::new([
            "{\"tool\": \"craft\", \"args\": {\"item\": \"stick\", \"amount\": 4}}",
            "I need planks first.",
        ]));
        let planner = Planner::new(llm, "");
        let executor = ActionExecutor::new(world.clone(), state, ExecutorConfig::default());
        let recovery = RecoveryEngine::default();
        let session = DispatchSession::new(&planner, &executor, world.as_ref(), &recovery);

        let outcome = dispatch(&session, vec![Message::user("make sticks")]).await.unwrap();
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.diagnostics, 1);
        let diag = outcome
            .transcript
            .iter()
            .find(|m| m.content.starts_with("Error: Action craft failed"))
            .unwrap();
        assert!(diag.content.contains("Hint: stick is crafted from 2 oak_planks"));
    }

    #[tokio::test]
    async fn test_hint_sees_inventory_changed_earlier_in_round() {
        let world = Arc::new(SimWorld::standard());
        world.give("oak_log", 1);
        let state = Arc::new(AgentState::new("bot"));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"[{"tool": "craft", "args": {"item": "oak_planks", "amount": 4}},
                {"tool": "craft", "args": {"item": "stick", "amount": 12}}]"#,
            "Not enough planks.",
        ]));
        let planner = Planner::new(llm, "");
        let executor = ActionExecutor::new(world.clone(), state, ExecutorConfig::default());
        let recovery = RecoveryEngine::default();
        let session = DispatchSession::new(&planner, &executor, world.as_ref(), &recovery);

        let outcome = dispatch(&session, vec![Message::user("make sticks")]).await.unwrap();
        assert_eq!(outcome.diagnostics, 1);
        assert_eq!(world.count("oak_planks"), 4);
        let diag = outcome
            .transcript
            .iter()
            .find(|m| m.content.starts_with("Error: Action craft failed"))
            .unwrap();
        // 4 块木板已在背包里，提示不应再要求先合成木板
        assert!(diag.content.contains("Plan from current inventory: craft(stick, 4)."));
        assert!(!diag.content.contains("craft(oak_planks"));
    }
}
