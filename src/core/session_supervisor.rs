//! 会话监管：控制器各循环的停止句柄与暂停开关
//!
//! 快循环、慢循环与扫描 worker 各持有一个子 token；stop 取消父 token 即停止全部触发器。
//! 暂停期间 tick 照常触发，但慢循环跳过目标状态机（快循环的防御反射不受影响）。

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    paused: Arc<RwLock<bool>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            paused: Arc::new(RwLock::new(false)),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 为单个循环创建子 token
    pub fn loop_token(&self, loop_name: &str) -> CancellationToken {
        tracing::debug!(loop_name = loop_name, "loop token issued");
        self.cancel_token.child_token()
    }

    /// 停止所有循环触发器；进行中的 tick 不会被打断
    pub fn stop(&self, reason: &str) {
        if !self.cancel_token.is_cancelled() {
            tracing::info!(reason = reason, "stopping controller loops");
        }
        self.cancel_token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    pub async fn set_paused(&self, paused: bool) {
        *self.paused.write().await = paused;
        tracing::info!(paused, "goal machine pause toggled");
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_cancels_every_loop_token() {
        let supervisor = SessionSupervisor::new();
        let fast = supervisor.loop_token("fast");
        let slow = supervisor.loop_token("slow");
        assert!(!fast.is_cancelled());
        supervisor.stop("test");
        assert!(fast.is_cancelled());
        assert!(slow.is_cancelled());
        assert!(supervisor.is_stopped());
    }

    #[tokio::test]
    async fn test_cancelling_one_loop_leaves_others_running() {
        let supervisor = SessionSupervisor::new();
        let fast = supervisor.loop_token("fast");
        let slow = supervisor.loop_token("slow");
        fast.cancel();
        assert!(!slow.is_cancelled());
        assert!(!supervisor.is_stopped());
    }

    #[tokio::test]
    async fn test_pause_flag() {
        let supervisor = SessionSupervisor::default();
        assert!(!supervisor.is_paused().await);
        supervisor.set_paused(true).await;
        assert!(supervisor.clone().is_paused().await);
    }
}
