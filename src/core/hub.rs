//! 多 Agent 消息中枢
//!
//! 每个 Agent 在独立的执行上下文中运行，彼此不共享状态；唯一的交互方式是经 AgentHub 投递的异步消息。
//! 注册时拿到一个 Mailbox（无界 mpsc 接收端），慢循环每个 tick 把信箱清空写入事件日志。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::AgentError;

/// Agent 间的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// 某个 Agent 的信箱
#[derive(Debug)]
pub struct Mailbox {
    owner: String,
    rx: mpsc::UnboundedReceiver<AgentMessage>,
}

impl Mailbox {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 取出当前已到达的全部消息，不等待
    pub fn drain(&mut self) -> Vec<AgentMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// 等待下一条消息；中枢与所有发送端都已释放时返回 None
    pub async fn recv(&mut self) -> Option<AgentMessage> {
        self.rx.recv().await
    }
}

/// 消息中枢
#[derive(Debug, Clone, Default)]
pub struct AgentHub {
    routes: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<AgentMessage>>>>,
}

impl AgentHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Agent；同名重复注册会替换旧信箱（旧信箱不再收到新消息）
    pub fn register(&self, name: impl Into<String>) -> Mailbox {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes.insert(name.clone(), tx).is_some() {
            tracing::warn!(agent = %name, "agent re-registered, previous mailbox detached");
        }
        Mailbox { owner: name, rx }
    }

    pub fn unregister(&self, name: &str) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    pub fn agents(&self) -> Vec<String> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = routes.keys().cloned().collect();
        names.sort();
        names
    }

    /// 投递消息；收件人未注册或信箱已关闭时报错
    pub fn send(&self, from: &str, to: &str, content: impl Into<String>) -> Result<(), AgentError> {
        let msg = AgentMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.into(),
            sent_at: Utc::now(),
        };
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let tx = routes
            .get(to)
            .ok_or_else(|| AgentError::Delivery(format!("no agent named {to}")))?;
        tx.send(msg)
            .map_err(|_| AgentError::Delivery(format!("mailbox of {to} is closed")))?;
        tracing::debug!(from = %from, to = %to, "agent message delivered");
        Ok(())
    }

    /// 发给除发送者以外的所有已注册 Agent，返回送达数
    pub fn broadcast(&self, from: &str, content: &str) -> usize {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes
            .iter()
            .filter(|(name, _)| name.as_str() != from)
            .filter(|(name, tx)| {
                tx.send(AgentMessage {
                    from: from.to_string(),
                    to: name.to_string(),
                    content: content.to_string(),
                    sent_at: Utc::now(),
                })
                .is_ok()
            })
            .count()
    }
}
