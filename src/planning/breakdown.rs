//! 单层拆分：慢循环为长期目标 / 不可提交的短期目标取得一组子步骤

use crate::core::{AgentError, AmbientSnapshot};
use crate::llm::LlmClient;
use crate::planning::prompts;

/// 请求推理器把 goal 拆成一层有序子步骤；无法拆分时返回空列表
pub async fn breakdown(
    llm: &dyn LlmClient,
    goal: &str,
    ambient: &AmbientSnapshot,
) -> Result<Vec<String>, AgentError> {
    let messages = prompts::decompose_messages(goal, "(nothing yet)", &Default::default(), ambient);
    let reply = llm.complete(&messages).await?;
    let steps = prompts::parse_substeps(&reply);
    tracing::debug!(goal = %goal, steps = steps.len(), "goal breakdown");
    Ok(steps)
}
