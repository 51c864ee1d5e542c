//! LLM 层：推理器客户端抽象、文本调用协议与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod mock;
pub mod openai;
pub mod protocol;
pub mod traits;

pub use mock::{FnLlmClient, MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use protocol::{parse_reply, render_tool_section, with_tool_instructions};
pub use traits::{
    Invocation, LlmClient, LlmError, LlmReply, RetryConfig, RetryingLlmClient, TokenUsage, ToolSpec,
};
