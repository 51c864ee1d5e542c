//! 调度循环集成测试：脚本化推理器 + 内存模拟世界

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use forager::actions::{ActionExecutor, ExecutorConfig};
    use forager::core::{AgentError, AgentState, EventRole, RecoveryEngine};
    use forager::llm::{LlmError, ScriptedLlmClient};
    use forager::memory::{Message, Role};
    use forager::react::{dispatch, DispatchEvent, DispatchSession, Planner, FALLBACK_RESPONSE};
    use forager::world::{SimWorld, ThreatReport};

    struct Rig {
        world: Arc<SimWorld>,
        state: Arc<AgentState>,
        llm: Arc<ScriptedLlmClient>,
        planner: Planner,
        executor: ActionExecutor,
        recovery: RecoveryEngine,
    }

    fn rig(llm: ScriptedLlmClient) -> Rig {
        let world = Arc::new(SimWorld::standard());
        let state = Arc::new(AgentState::new("bot"));
        let llm = Arc::new(llm);
        let config = ExecutorConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        Rig {
            world: world.clone(),
            state: state.clone(),
            llm: llm.clone(),
            planner: Planner::new(llm, ""),
            executor: ActionExecutor::new(world, state, config),
            recovery: RecoveryEngine::default(),
        }
    }

    impl Rig {
        fn session(&self) -> DispatchSession<'_> {
            DispatchSession::new(&self.planner, &self.executor, self.world.as_ref(), &self.recovery)
        }
    }

    fn call(tool: &str, args: &str) -> String {
        format!("{{\"tool\": \"{tool}\", \"args\": {args}}}")
    }

    #[tokio::test]
    async fn test_plain_text_reply_finishes_in_one_round() {
        let rig = rig(ScriptedLlmClient::new(["Hello there."]));
        let outcome = dispatch(&rig.session(), vec![Message::user("say hi")]).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.response, "Hello there.");
        assert_eq!(rig.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tools_become_diagnostics() {
        let n = 3;
        let mut replies: Vec<String> = (0..n).map(|i| call(&format!("teleport{i}"), "{}")).collect();
        replies.push("I cannot do that.".into());
        let rig = rig(ScriptedLlmClient::new(replies));

        let outcome = dispatch(&rig.session(), vec![Message::user("go home")]).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.rounds, n + 1);
        assert_eq!(outcome.diagnostics, n);
        let diagnostics: Vec<&Message> = outcome
            .transcript
            .iter()
            .filter(|m| m.role == Role::Tool && m.content.contains("is not implemented"))
            .collect();
        assert_eq!(diagnostics.len(), n);
    }

    #[tokio::test]
    async fn test_round_limit_returns_fallback() {
        let rig = rig(ScriptedLlmClient::repeating(call("chat", r#"{"text": "still here"}"#)));
        let session = rig.session().with_max_rounds(4);
        let outcome = dispatch(&session, vec![Message::user("keep talking")]).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.response, FALLBACK_RESPONSE);
        assert_eq!(outcome.rounds, 4);
        assert_eq!(rig.llm.calls(), 4);
        assert_eq!(rig.world.chat_log().len(), 4);
    }

    #[tokio::test]
    async fn test_reasoner_failure_aborts_without_result() {
        let rig = rig(ScriptedLlmClient::from_results([
            Ok(call("chat", r#"{"text": "hi"}"#)),
            Err(LlmError::Request("connection reset".into())),
        ]));
        let err = dispatch(&rig.session(), vec![Message::user("chat")]).await.unwrap_err();
        assert!(matches!(err, AgentError::Reasoner(_)));
        assert_eq!(rig.world.chat_log().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_arguments_do_not_abort_round() {
        let rig = rig(ScriptedLlmClient::new([
            format!(
                "[{}, {}]",
                call("mine", r#"{"count": "lots"}"#),
                call("mine", r#"{"block": "oak_log", "count": 2}"#)
            ),
            "Done.".to_string(),
        ]));
        let outcome = dispatch(&rig.session(), vec![Message::user("get wood")]).await.unwrap();
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.diagnostics, 1);
        assert_eq!(rig.world.count("oak_log"), 2);
        let tool_msgs: Vec<&Message> = outcome.transcript.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert!(tool_msgs[0].content.starts_with("Error"));
        assert!(tool_msgs[1].content.starts_with("mine(oak_log, 2)"));
    }

    #[tokio::test]
    async fn test_invocations_run_in_reply_order() {
        let rig = rig(ScriptedLlmClient::new([
            format!(
                "[{}, {}]",
                call("mine", r#"{"block": "oak_log", "count": 1}"#),
                call("craft", r#"{"item": "oak_planks", "amount": 1}"#)
            ),
            "Planks ready.".to_string(),
        ]));
        let outcome = dispatch(&rig.session(), vec![Message::user("make planks")]).await.unwrap();
        assert_eq!(outcome.diagnostics, 0);
        assert!(rig.world.count("oak_planks") > 0);
    }

    #[tokio::test]
    async fn test_threat_is_injected_before_reasoning() {
        let rig = rig(ScriptedLlmClient::new(["Fighting back."]));
        rig.world
            .set_threat(ThreatReport::attacked_by("zombie", "Health dropped by 3."));
        let outcome = dispatch(&rig.session(), vec![Message::user("gather wood")]).await.unwrap();
        assert!(outcome.completed);

        let first_request = &rig.llm.requests()[0];
        let urgent = first_request
            .iter()
            .find(|m| m.content.starts_with("URGENT"))
            .expect("threat message in first request");
        assert!(urgent.content.contains("zombie"));
        assert!(rig
            .state
            .events()
            .snapshot()
            .iter()
            .any(|r| r.role == EventRole::Reflex));
    }

    #[tokio::test]
    async fn test_pathfinding_timeout_is_retried() {
        let rig = rig(ScriptedLlmClient::new([
            call("mine", r#"{"block": "oak_log", "count": 3}"#),
            "Got logs.".to_string(),
        ]));
        rig.world.fail_pathfinding(2);
        let outcome = dispatch(&rig.session(), vec![Message::user("logs")]).await.unwrap();
        assert_eq!(outcome.diagnostics, 0);
        assert_eq!(rig.world.count("oak_log"), 3);
        let audit = rig
            .state
            .events()
            .snapshot()
            .into_iter()
            .find(|r| r.role == EventRole::Action)
            .and_then(|r| r.metadata)
            .unwrap();
        assert_eq!(audit["attempts"], 3);
    }

    #[tokio::test]
    async fn test_state_summary_follows_each_round() {
        let rig = rig(ScriptedLlmClient::new([call("sortInventory", "{}"), "Sorted.".to_string()]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = rig.session().with_event_tx(&tx);
        let outcome = dispatch(&session, vec![Message::user("tidy up")]).await.unwrap();

        let summary_index = outcome
            .transcript
            .iter()
            .position(|m| m.role == Role::User && m.content.starts_with("## Current state"))
            .unwrap();
        assert_eq!(outcome.transcript[summary_index - 1].role, Role::Tool);

        drop(session);
        drop(tx);
        let mut finished = false;
        while let Some(ev) = rx.recv().await {
            if let DispatchEvent::Finished { rounds, .. } = ev {
                assert_eq!(rounds, 2);
                finished = true;
            }
        }
        assert!(finished);
    }
}
