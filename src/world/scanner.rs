//! 独立扫描 worker：在自己的任务里按周期做全范围方块扫描，把快照写入共享状态
//!
//! 扫描不再占用控制循环；停止时取消令牌，正在进行的一次扫描完成后退出。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::AgentState;
use crate::world::Perception;

pub struct ScanWorker {
    cancel: CancellationToken,
    handle: JoinHandle<u64>,
}

impl ScanWorker {
    /// 启动 worker；第一次扫描立即进行
    pub fn spawn(state: Arc<AgentState>, perception: Arc<dyn Perception>, period: Duration) -> Self {
        Self::spawn_with_token(state, perception, period, CancellationToken::new())
    }

    /// 使用外部令牌（如会话监管的子令牌）启动
    pub fn spawn_with_token(
        state: Arc<AgentState>,
        perception: Arc<dyn Perception>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut scans = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match perception.scan_blocks().await {
                    Ok(blocks) => {
                        scans += 1;
                        tracing::debug!(scan = scans, blocks = blocks.len(), "block scan");
                        state.set_blocks(blocks);
                    }
                    Err(e) => tracing::warn!("block scan failed: {}", e),
                }
            }
            scans
        });
        Self { cancel, handle }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 停止并等待退出，返回成功扫描次数
    pub async fn stop(self) -> u64 {
        self.cancel.cancel();
        self.handle.await.unwrap_or(0)
    }
}
