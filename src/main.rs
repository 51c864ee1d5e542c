//! Forager - 具身智能体认知核心
//!
//! 入口：初始化日志、加载配置、装配 Agent（没有 API Key 时使用 mock 推理器与内存模拟世界），然后执行子命令：
//! - `forager run <goal>...`：目标入队，运行快慢双循环直到 Ctrl+C / SIGTERM
//! - `forager plan [--dfs] <goal>`：增量打印任务树
//! - `forager do <instruction>`：运行一次调度循环并打印最终回复

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use forager::config::load_config_or_default;
use forager::core::{
    run_with_graceful_shutdown, ControllerCleanup, EventLogCleanup, ShutdownCoordinator, ShutdownManager,
};
use forager::planning::{render_tree, Traversal};
use forager::react::DispatchEvent;
use forager::{observability, Agent};

#[derive(Parser)]
#[command(name = "forager")]
#[command(about = "Cognitive core for an autonomous game agent", version)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue long-term goals and run the controller loops
    Run {
        #[arg(required = true)]
        goals: Vec<String>,
    },
    /// Build and print the goal tree for one goal
    Plan {
        /// Depth-first expansion instead of breadth-first
        #[arg(long)]
        dfs: bool,
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
    },
    /// Run one dispatch loop for an instruction
    Do {
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config_or_default(cli.config);
    let (agent, _world) = Agent::offline(cfg).context("Failed to assemble agent")?;

    match cli.command {
        Commands::Run { goals } => run(agent, goals).await,
        Commands::Plan { dfs, goal } => plan(&agent, &goal.join(" "), dfs).await,
        Commands::Do { instruction } => run_once(&agent, &instruction.join(" ")).await,
    }
}

async fn run(agent: Agent, goals: Vec<String>) -> anyhow::Result<()> {
    for goal in goals {
        agent.state().enqueue_goal(goal);
    }

    let manager = Arc::new(ShutdownManager::new());
    let handle = agent.controller().start();
    let mut coordinator = ShutdownCoordinator::new(manager.clone());
    coordinator.register(ControllerCleanup::new(handle));
    coordinator.register(EventLogCleanup::new(agent.state().clone(), manager.clone()));

    let mut events = agent.state().events().subscribe();
    let printer = async {
        loop {
            match events.recv().await {
                Ok(record) => println!("[{:?}] {}", record.role, record.content),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    let report = run_with_graceful_shutdown(&coordinator, printer).await;
    for (task, reason) in &report.failed {
        eprintln!("cleanup {task} failed: {reason}");
    }
    agent.controller().wait_for_dispatch().await;
    Ok(())
}

async fn plan(agent: &Agent, goal: &str, dfs: bool) -> anyhow::Result<()> {
    let mode = dfs.then_some(Traversal::DepthFirst);
    let mut shown = 0usize;
    let nodes = agent
        .plan(goal, mode, |nodes| {
            for node in &nodes[shown..] {
                let call = node
                    .resolved_call
                    .as_ref()
                    .map(|c| format!(" => {}", c.signature()))
                    .unwrap_or_default();
                println!("{}+ {}{}", "  ".repeat(node.depth), node.step, call);
            }
            shown = nodes.len();
        })
        .await
        .context("Planning failed")?;
    println!("\n{}", render_tree(&nodes));
    Ok(())
}

async fn run_once(agent: &Agent, instruction: &str) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match ev {
                DispatchEvent::Invocation { tool, args } => println!("-> {tool} {args}"),
                DispatchEvent::Observation { preview, .. } => println!("   {preview}"),
                DispatchEvent::Diagnostic { text, .. } => println!("   ! {text}"),
                DispatchEvent::Interrupt { message } => println!("!! {message}"),
                _ => {}
            }
        }
    });
    let outcome = agent
        .run_instruction(instruction, Some(&tx))
        .await
        .context("Dispatch failed")?;
    drop(tx);
    let _ = printer.await;
    let usage = agent.llm().token_usage();
    tracing::info!(
        rounds = outcome.rounds,
        diagnostics = outcome.diagnostics,
        prompt_tokens = usage.prompt,
        completion_tokens = usage.completion,
        "dispatch finished"
    );
    println!("{}", outcome.response);
    Ok(())
}
