//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供调度循环决定是写回诊断继续、附带知识提示继续，还是终止。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::actions::RecipeBook;
use crate::core::{AgentError, RecoveryAction};

/// 本地恢复：参数解析错误、原语失败、未知原语都转为诊断；推理服务失败终止
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    knowledge: Arc<RecipeBook>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(Arc::new(RecipeBook::standard()))
    }
}

impl RecoveryEngine {
    pub fn new(knowledge: Arc<RecipeBook>) -> Self {
        Self { knowledge }
    }

    pub fn knowledge(&self) -> &RecipeBook {
        &self.knowledge
    }

    /// target：失败调用想要获得的物品（如 craft 的 item），错误本身没带物品名时用它查提示
    pub fn handle(
        &self,
        err: &AgentError,
        target: Option<&str>,
        inventory: &BTreeMap<String, u32>,
    ) -> RecoveryAction {
        match err {
            AgentError::ParseError { tool, detail } => RecoveryAction::Diagnose(format!(
                "Error: the arguments for {tool} could not be parsed ({detail}). \
                 Arguments must be a JSON object matching the tool's parameters."
            )),
            AgentError::UnknownCapability(_) => {
                RecoveryAction::Diagnose(format!("Error: {err}. Use only the declared tools."))
            }
            AgentError::ActionFailed { source, .. } => {
                let diagnostic = format!("Error: {err}");
                if !source.is_missing_prerequisite() {
                    return RecoveryAction::Diagnose(diagnostic);
                }
                let hint = source
                    .missing_item()
                    .or(target)
                    .and_then(|item| self.knowledge.hint_for(item, inventory));
                match hint {
                    Some(hint) => RecoveryAction::DiagnoseWithHint { diagnostic, hint },
                    None => RecoveryAction::Diagnose(diagnostic),
                }
            }
            _ => RecoveryAction::Abort,
        }
    }
}
