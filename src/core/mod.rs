//! 核心编排层：共享状态、事件日志、目标栈、认知控制器、周期调度、消息中枢、错误与恢复、关闭

pub mod controller;
pub mod error;
pub mod event_log;
pub mod goals;
pub mod hub;
pub mod recovery;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;
pub mod task_scheduler;

pub use controller::{CognitiveController, ControllerConfig, ControllerHandle, GoalExecutor};
pub use error::{ActionError, AgentError, RecoveryAction};
pub use event_log::{load_jsonl, EventLog, EventRecord, EventRole};
pub use goals::{parse_task_pattern, GoalPhase, GoalPolicy, GoalStack, TaskPatternPolicy};
pub use hub::{AgentHub, AgentMessage, Mailbox};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use shutdown::{
    run_with_graceful_shutdown, CleanupReport, ControllerCleanup, EventLogCleanup, ShutdownCleanup,
    ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
pub use state::{AgentState, AmbientSnapshot, PerceptionSnapshot, SentimentDirection};
pub use task_scheduler::{PeriodicTask, TickStats};
