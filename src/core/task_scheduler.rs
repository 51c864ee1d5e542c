//! 周期任务调度
//!
//! 每个周期任务在自己的 tokio 任务里按固定周期触发；每次 tick 单独 spawn：
//! - 上一次 tick 尚未结束时跳过本次（skip-if-running）
//! - tick 返回错误或 panic 只记日志，不影响后续 tick
//! - 停止只是取消触发器；已经开始的 tick 继续运行到结束

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

/// 一次 tick 的执行体
pub type TickFuture = BoxFuture<'static, Result<(), AgentError>>;

/// tick 计数
#[derive(Debug, Default)]
pub struct TickStats {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl TickStats {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// 运行中的周期任务
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    stats: Arc<TickStats>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// 启动周期任务；第一次 tick 立即触发。tick 参数为从 1 开始的 tick 序号
    pub fn spawn<F>(name: &'static str, period: Duration, cancel: CancellationToken, tick: F) -> Self
    where
        F: Fn(u64) -> TickFuture + Send + Sync + 'static,
    {
        let stats = Arc::new(TickStats::default());
        let running = Arc::new(AtomicBool::new(false));
        let token = cancel.clone();
        let loop_stats = stats.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut tick_no = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tick_no += 1;
                if running.swap(true, Ordering::AcqRel) {
                    loop_stats.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(loop_name = name, tick = tick_no, "previous tick still running, skipped");
                    continue;
                }
                loop_stats.started.fetch_add(1, Ordering::Relaxed);

                let body = tick(tick_no);
                let running = running.clone();
                let stats = loop_stats.clone();
                tokio::spawn(async move {
                    match AssertUnwindSafe(body).catch_unwind().await {
                        Ok(Ok(())) => {
                            stats.completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(loop_name = name, tick = tick_no, "tick failed: {}", e);
                        }
                        Err(_) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(loop_name = name, tick = tick_no, "tick panicked");
                        }
                    }
                    running.store(false, Ordering::Release);
                });
            }
            tracing::debug!(loop_name = name, "periodic trigger stopped");
        });

        Self {
            name,
            cancel,
            stats,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> Arc<TickStats> {
        self.stats.clone()
    }

    /// 取消触发器并等待它退出（不等待进行中的 tick）
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_do_not_stop_schedule() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let task = PeriodicTask::spawn("flaky", Duration::from_secs(1), CancellationToken::new(), move |tick| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if tick % 2 == 1 {
                    Err(AgentError::Planning("odd tick".into()))
                } else {
                    Ok(())
                }
            })
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let stats = task.stats();
        task.stop().await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let task = PeriodicTask::spawn("slow", Duration::from_secs(1), CancellationToken::new(), |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                Ok(())
            })
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let stats = task.stats();
        task.stop().await;
        // t=0 开始，t=1、t=2 跳过，t=3 再次开始
        assert_eq!(stats.started(), 2);
        assert_eq!(stats.skipped(), 2);
        assert_eq!(stats.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_is_contained() {
        let task = PeriodicTask::spawn("panicky", Duration::from_secs(1), CancellationToken::new(), |tick| {
            Box::pin(async move {
                if tick == 1 {
                    panic!("boom");
                }
                Ok(())
            })
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let stats = task.stats();
        task.stop().await;
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.completed(), 1);
    }
}
