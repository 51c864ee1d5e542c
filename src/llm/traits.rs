//! 推理器客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（纯文本）与 complete_with_tools（声明原语菜单）。
//! complete_with_tools 默认走文本协议：把菜单与调用格式注入 system 消息，再从回复中解析调用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::protocol::{parse_reply, with_tool_instructions};
use crate::memory::Message;

/// 推理服务错误：任何一种都会中止当前调度
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("unexpected response: {0}")]
    BadResponse(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl LlmError {
    /// 网络 / 超时类错误可以重试
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout(_))
    }
}

/// 向推理器声明的一个可调用原语
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: serde_json::Value,
}

/// 推理器请求的一次原语调用；参数保留原始 JSON 文本，由调度循环解析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// 推理器回复：文本 + 零个或多个调用（按顺序处理）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmReply {
    pub text: String,
    pub invocations: Vec<Invocation>,
}

impl LlmReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            invocations: Vec::new(),
        }
    }
}

/// 累计 token 用量快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// 推理器客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 纯文本完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 带原语菜单的完成；回复可以是纯文本，也可以带一个或多个调用
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        let augmented = with_tool_instructions(messages, tools);
        let output = self.complete(&augmented).await?;
        Ok(parse_reply(&output))
    }

    /// 不统计用量的后端返回零
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// 重试配置：只对网络 / 超时类错误生效，固定退避
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// 给任意 LlmClient 加上有限重试；重试耗尽后返回 Exhausted
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn retry<T, F, Fut>(&self, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, LlmError>> + Send,
        T: Send,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, "reasoner call failed: {}", e);
                    last = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(LlmError::Exhausted { attempts, last })
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.retry(|| self.inner.complete(messages)).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        self.retry(|| self.inner.complete_with_tools(messages, tools)).await
    }

    fn token_usage(&self) -> TokenUsage {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_retrying_client_recovers_from_transient_errors() {
        let scripted = Arc::new(ScriptedLlmClient::from_results(vec![
            Err(LlmError::Request("connection reset".into())),
            Ok("done".into()),
        ]));
        let client = RetryingLlmClient::new(
            scripted.clone(),
            RetryConfig {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        );
        assert_eq!(client.complete(&[Message::user("hi")]).await.unwrap(), "done");
        assert_eq!(scripted.calls(), 2);
    }

    #[tokio::test]
    async fn test_retrying_client_gives_up() {
        let scripted = Arc::new(ScriptedLlmClient::from_results(vec![
            Err(LlmError::Timeout(5)),
            Err(LlmError::Timeout(5)),
        ]));
        let client = RetryingLlmClient::new(
            scripted,
            RetryConfig {
                max_attempts: 2,
                backoff: Duration::from_millis(1),
            },
        );
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_bad_response_is_not_retried() {
        let scripted = Arc::new(ScriptedLlmClient::from_results(vec![Err(
            LlmError::BadResponse("empty choices".into()),
        )]));
        let client = RetryingLlmClient::new(scripted.clone(), RetryConfig::default());
        assert!(client.complete(&[]).await.is_err());
        assert_eq!(scripted.calls(), 1);
    }
}
