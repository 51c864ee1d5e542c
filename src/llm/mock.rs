//! Mock / 脚本化推理器（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：调度时回显最后一条 User 消息，分解与匹配请求一律回答 NONE
//! - ScriptedLlmClient：按顺序返回预设回复，并记录每次请求
//! - FnLlmClient：用闭包按请求内容决定回复

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmReply, ToolSpec};
use crate::memory::{last_user_content, Message};

/// Mock 客户端：没有配置 API Key 时的后备
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Ok("NONE".to_string())
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        let last_user = last_user_content(messages).unwrap_or("(no input)");
        Ok(LlmReply::text(format!("Echo from Mock: {last_user}")))
    }
}

/// 脚本化客户端：依次弹出预设结果；耗尽后重复 `repeat` 或返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|s| Ok(s.into())))
    }

    pub fn from_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次都返回同一回复
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后改为重复该回复
    pub fn then_repeat(mut self, reply: impl Into<String>) -> Self {
        self.repeat = Some(reply.into());
        self
    }

    /// 已收到的请求次数
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 已收到的全部请求（按时间顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(LlmError::BadResponse("script exhausted".into())),
        }
    }
}

type ReplyFn = dyn Fn(&[Message]) -> Result<String, LlmError> + Send + Sync;

/// 闭包客户端：按请求内容生成回复（确定性测试桩）
pub struct FnLlmClient {
    reply: Box<ReplyFn>,
}

impl FnLlmClient {
    pub fn new(reply: impl Fn(&[Message]) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
        }
    }
}

#[async_trait]
impl LlmClient for FnLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        (self.reply)(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let reply = MockLlmClient
            .complete_with_tools(&[Message::user("gather wood")], &[])
            .await
            .unwrap();
        assert_eq!(reply.text, "Echo from Mock: gather wood");
        assert!(reply.invocations.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_then_repeat() {
        let client = ScriptedLlmClient::new(["first"]).then_repeat("again");
        assert_eq!(client.complete(&[]).await.unwrap(), "first");
        assert_eq!(client.complete(&[]).await.unwrap(), "again");
        assert_eq!(client.complete(&[]).await.unwrap(), "again");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_exhausted_is_error() {
        let client = ScriptedLlmClient::new(Vec::<String>::new());
        assert!(client.complete(&[]).await.is_err());
    }
}
