//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 或主任务结束后依次执行清理：
//! - 停止控制器的快慢循环与扫描 worker
//! - 在事件日志末尾写入关闭记录（含未完成的目标）
//!
//! 进行中的调度不被打断，由调用方决定是否等待它结束。

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::controller::ControllerHandle;
use crate::core::event_log::EventRole;
use crate::core::state::AgentState;

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInitiated => write!(f, "user initiated"),
            Self::Signal => write!(f, "terminated by signal"),
            Self::FatalError(e) => write!(f, "fatal error: {e}"),
        }
    }
}

/// 关闭信号：一个取消 token + 第一次触发的原因
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；重复触发只保留第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        let mut slot = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            tracing::info!(reason = %reason, "shutdown requested");
            *slot = Some(reason);
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Ctrl+C → UserInitiated；unix 下 SIGTERM → Signal
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        manager.shutdown(ShutdownReason::Signal);
                    }
                    Err(e) => tracing::warn!("SIGTERM handler unavailable: {}", e),
                }
            });
        }
    }
}

/// 关闭时执行的一项清理
#[async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 日志中的名称
    fn name(&self) -> &'static str;
}

/// 一轮清理的结果
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub completed: Vec<&'static str>,
    /// (名称, 失败或超时原因)
    pub failed: Vec<(&'static str, String)>,
}

/// 按注册顺序执行清理，每项有独立超时
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    tasks: Vec<Box<dyn ShutdownCleanup>>,
    per_task_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            tasks: Vec::new(),
            per_task_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_task_timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.tasks.push(Box::new(task));
    }

    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }

    /// 某项失败或超时不影响后续项
    pub async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for task in &self.tasks {
            let name = task.name();
            match tokio::time::timeout(self.per_task_timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "cleanup done");
                    report.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = name, "cleanup failed: {}", e);
                    report.failed.push((name, e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(task = name, timeout = ?self.per_task_timeout, "cleanup timed out");
                    report.failed.push((name, "timed out".to_string()));
                }
            }
        }
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "shutdown cleanup finished"
        );
        report
    }
}

/// 停止控制器循环（进行中的调度不打断）
pub struct ControllerCleanup {
    handle: tokio::sync::Mutex<Option<ControllerHandle>>,
}

impl ControllerCleanup {
    pub fn new(handle: ControllerHandle) -> Self {
        Self {
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl ShutdownCleanup for ControllerCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.handle.lock().await.take() {
            let fast = handle.fast_stats();
            let slow = handle.slow_stats();
            handle.stop().await;
            tracing::info!(
                fast_ticks = fast.started(),
                slow_ticks = slow.started(),
                failed = fast.failed() + slow.failed(),
                "controller loops stopped"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "controller"
    }
}

/// 在事件日志末尾写入关闭记录
pub struct EventLogCleanup {
    state: Arc<AgentState>,
    manager: Arc<ShutdownManager>,
}

impl EventLogCleanup {
    pub fn new(state: Arc<AgentState>, manager: Arc<ShutdownManager>) -> Self {
        Self { state, manager }
    }
}

#[async_trait]
impl ShutdownCleanup for EventLogCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let reason = self
            .manager
            .reason()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "finished".to_string());
        let goals = self.state.goals();
        self.state.log_with(
            EventRole::System,
            format!("shutdown: {reason}"),
            serde_json::json!({
                "events": self.state.events().len(),
                "long_term": goals.long_term(),
                "short_term": goals.short_term(),
                "pending": goals.pending().collect::<Vec<_>>(),
            }),
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "event-log"
    }
}

/// 运行主任务直到它结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F>(coordinator: &ShutdownCoordinator, app: F) -> CleanupReport
where
    F: Future<Output = ()>,
{
    let manager = coordinator.manager().clone();
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::info!("main task finished"),
        _ = manager.wait_for_shutdown() => {}
    }

    coordinator.run_cleanup().await
}
