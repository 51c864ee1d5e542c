//! 认知控制器集成测试：目标状态机端到端推进、信箱、暂停、周期循环启停

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use forager::actions::RecipeBook;
    use forager::config::AppConfig;
    use forager::core::{AgentHub, EventRole, GoalPhase, SentimentDirection};
    use forager::llm::{MockLlmClient, ScriptedLlmClient};
    use forager::world::SimWorld;
    use forager::Agent;

    fn agent_with(llm: ScriptedLlmClient) -> (Agent, Arc<SimWorld>, Arc<ScriptedLlmClient>) {
        let world = Arc::new(SimWorld::standard());
        let llm = Arc::new(llm);
        let agent = Agent::new(
            AppConfig::default(),
            llm.clone(),
            world.clone(),
            world.clone(),
            Arc::new(RecipeBook::standard()),
        )
        .unwrap();
        (agent, world, llm)
    }

    fn goal_events(agent: &Agent) -> Vec<String> {
        agent
            .state()
            .events()
            .snapshot()
            .into_iter()
            .filter(|r| r.role == EventRole::Goal)
            .map(|r| r.content)
            .collect()
    }

    #[tokio::test]
    async fn test_goal_runs_from_queue_to_completion() {
        let (agent, world, llm) = agent_with(ScriptedLlmClient::new([
            // breakdown：无法再拆，长期目标本身成为短期目标
            "NONE".to_string(),
            r#"{"tool": "mine", "args": {"block": "oak_log", "count": 2}}"#.to_string(),
            "I have two oak logs now.".to_string(),
        ]));
        let ctl = agent.controller();
        agent.state().enqueue_goal("Collect oak log (2)");

        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::HasLongTermNoShortTerm);
        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::HasShortTerm);
        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::LockedIn);

        ctl.slow_tick().await.unwrap();
        ctl.wait_for_dispatch().await;
        assert!(!ctl.is_executing());
        assert_eq!(world.count("oak_log"), 2);
        assert_eq!(llm.calls(), 3);

        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::HasLongTermNoShortTerm);
        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::NoGoal);

        let goals = goal_events(&agent);
        assert!(goals.contains(&"locked in: Collect oak log (2)".to_string()));
        assert!(goals.contains(&"completed: Collect oak log (2)".to_string()));
        assert!(goals.iter().any(|g| g.starts_with("long-term goal finished")));

        let dispatched = agent
            .state()
            .events()
            .snapshot()
            .into_iter()
            .find(|r| r.role == EventRole::User)
            .unwrap();
        assert_eq!(dispatched.content, "Your current task: Collect oak log (2)");
    }

    #[tokio::test]
    async fn test_goal_already_in_inventory_is_skipped() {
        let (agent, world, llm) = agent_with(ScriptedLlmClient::new(["1. Collect dirt (3)\n2. Mine 1 stone"]));
        world.give("dirt", 5);
        let ctl = agent.controller();
        agent.state().enqueue_goal("prepare a shelter");

        ctl.slow_tick().await.unwrap(); // adopt
        ctl.slow_tick().await.unwrap(); // breakdown
        assert_eq!(agent.state().goals().short_term(), Some("Collect dirt (3)"));
        ctl.slow_tick().await.unwrap(); // satisfied
        assert_eq!(agent.state().goals().short_term(), Some("Mine 1 stone"));
        assert!(goal_events(&agent).contains(&"already satisfied: Collect dirt (3)".to_string()));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_mailbox_messages_reach_log_and_ledger() {
        let hub = AgentHub::new();
        let (agent, _, _) = agent_with(ScriptedLlmClient::default());
        let agent = agent.with_mailbox(hub.register("bot"));

        hub.send("alice", "bot", "thanks for the bread").unwrap();
        hub.send("mallory", "bot", "go away, thief").unwrap();
        agent.controller().slow_tick().await.unwrap();

        let messages: Vec<_> = agent
            .state()
            .events()
            .snapshot()
            .into_iter()
            .filter(|r| r.role == EventRole::Message)
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].metadata.as_ref().unwrap()["from"], "alice");

        let alice = agent.state().sentiment("alice", SentimentDirection::Incoming).unwrap();
        assert_eq!(alice.score, 1);
        let mallory = agent.state().sentiment("mallory", SentimentDirection::Incoming).unwrap();
        assert_eq!(mallory.score, -1);
        assert!(agent.state().sentiment("alice", SentimentDirection::Outgoing).is_none());
    }

    #[tokio::test]
    async fn test_paused_controller_keeps_perceiving() {
        let (agent, world, llm) = agent_with(ScriptedLlmClient::default());
        let ctl = agent.controller();
        agent.state().enqueue_goal("Mine 3 stone");
        world.give("bread", 2);

        ctl.supervisor().set_paused(true).await;
        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goal_phase(), GoalPhase::NoGoal);
        assert!(agent.state().inventory().iter().any(|l| l == "bread:2"));
        assert_eq!(llm.calls(), 0);

        ctl.supervisor().set_paused(false).await;
        ctl.slow_tick().await.unwrap();
        assert_eq!(agent.state().goals().long_term(), Some("Mine 3 stone"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_loops_tick_until_stopped() {
        let world = Arc::new(SimWorld::standard());
        let agent = Agent::new(
            AppConfig::default(),
            Arc::new(MockLlmClient),
            world.clone(),
            world,
            Arc::new(RecipeBook::standard()),
        )
        .unwrap();
        let handle = agent.controller().start();
        let fast = handle.fast_stats();
        let slow = handle.slow_stats();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(fast.started() >= 5);
        assert_eq!(slow.started(), 2);
        assert_eq!(fast.failed(), 0);

        handle.stop().await;
        let after_stop = fast.started();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fast.started(), after_stop);
        assert!(agent.controller().supervisor().is_stopped());
        assert!(agent
            .state()
            .events()
            .snapshot()
            .iter()
            .any(|r| r.content == "controller started"));
    }
}
