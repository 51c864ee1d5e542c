//! OpenAI 兼容推理器
//!
//! 经 async_openai 调用任意 OpenAI 兼容端点（DeepSeek、OpenAI、自建代理）。
//! 原语调用走文本协议（见 protocol），所以只用到 chat completion。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::memory::{Message, Role};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 工具结果回传给推理器时的前缀
const TOOL_RESULT_PREFIX: &str = "Tool result: ";

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl OpenAiClient {
    /// api_key 为 None 时读 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(60),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    /// DeepSeek 端点，DEEPSEEK_API_KEY 优先于 OPENAI_API_KEY
    pub fn deepseek(model: Option<&str>) -> Self {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
        Self::new(Some(DEEPSEEK_BASE_URL), model.unwrap_or(DEEPSEEK_CHAT), api_key.as_deref())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn bad_request(e: OpenAIError) -> LlmError {
    LlmError::BadResponse(e.to_string())
}

fn user_message(content: String) -> Result<ChatCompletionRequestMessage, LlmError> {
    Ok(ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(bad_request)?,
    ))
}

/// transcript → API 消息；文本协议下工具结果以 user 身份回传
fn to_request_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => Ok(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(bad_request)?,
            )),
            Role::User => user_message(m.content.clone()),
            Role::Tool => user_message(format!("{TOOL_RESULT_PREFIX}{}", m.content)),
            Role::Assistant => Ok(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(bad_request)?,
            )),
        })
        .collect()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_request_messages(messages)?)
            .build()
            .map_err(bad_request)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.prompt_tokens
                .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        }
        tracing::debug!(model = %self.model, choices = response.choices.len(), "chat completion");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("no content in first choice".into()))
    }

    fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt_tokens.load(Ordering::Relaxed),
            completion: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_results_are_sent_as_user_turns() {
        let messages = [
            Message::system("rules"),
            Message::user("get wood"),
            Message::assistant(r#"{"tool": "mine", "args": {}}"#),
            Message::tool("mine(oak_log, 1): mined 1 oak_log"),
        ];
        let converted = to_request_messages(&messages).unwrap();
        assert_eq!(converted.len(), 4);
        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(converted[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(converted[3], ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_fresh_client_reports_zero_usage() {
        let client = OpenAiClient::new(Some("http://127.0.0.1:9"), "test-model", Some("sk-test"));
        assert_eq!(client.model(), "test-model");
        assert_eq!(client.token_usage().total(), 0);
    }
}
