//! Planner：持有推理器、system prompt 与原语菜单
//!
//! decide(transcript) 在 transcript 前拼上 system 消息后带菜单调用推理器。

use std::sync::Arc;

use crate::actions::tool_specs;
use crate::llm::{LlmClient, LlmError, LlmReply, ToolSpec};
use crate::memory::{Message, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You control an agent in a block-building survival world. Work toward the user's instruction \
one tool call at a time. After every round you receive the results of your calls and a summary \
of the current state. If a call fails, read the error and any hint, fix the cause, and try again. \
When the instruction is complete, or cannot be completed, answer in plain text without calling a tool.";

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tools: Vec<ToolSpec>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            tools: tool_specs(),
        }
    }

    /// 限制菜单（测试或特定角色）
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// transcript 自带 system 消息时不再重复添加
    pub async fn decide(&self, transcript: &[Message]) -> Result<LlmReply, LlmError> {
        let has_system = transcript.first().is_some_and(|m| m.role == Role::System);
        let messages: Vec<Message> = if has_system || self.system_prompt.is_empty() {
            transcript.to_vec()
        } else {
            std::iter::once(Message::system(self.system_prompt.clone()))
                .chain(transcript.iter().cloned())
                .collect()
        };
        self.llm.complete_with_tools(&messages, &self.tools).await
    }
}
