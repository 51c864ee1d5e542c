//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：调度循环内的参数解析错误、原语失败、未知原语都转为诊断继续；
//! 只有推理服务失败会中止本次调度。

use thiserror::Error;

use crate::llm::LlmError;

/// 外部行动 / 感知协作者报告的失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// 寻路 / 移动超时（执行器内有限重试，之后按普通失败上报）
    #[error("Pathfinding timed out: {0}")]
    PathfindTimeout(String),

    /// 缺少前置材料（如合成原料），会触发静态知识提示
    #[error("Missing ingredients for {item}: {detail}")]
    MissingIngredients { item: String, detail: String },

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PathfindTimeout(_))
    }

    /// 缺前置材料类失败对应的物品名；Failed 文本中提到 ingredient 时也按该类处理
    pub fn missing_item(&self) -> Option<&str> {
        match self {
            Self::MissingIngredients { item, .. } => Some(item),
            _ => None,
        }
    }

    pub fn is_missing_prerequisite(&self) -> bool {
        match self {
            Self::MissingIngredients { .. } => true,
            Self::Failed(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("ingredient") || lower.contains("missing material")
            }
            Self::PathfindTimeout(_) => false,
        }
    }
}

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 原语参数格式错误（本地恢复，作为诊断写回 transcript）
    #[error("Malformed arguments for {tool}: {detail}")]
    ParseError { tool: String, detail: String },

    /// 原语执行失败（本地恢复，可附带静态知识提示）
    #[error("Action {tool} failed: {source}")]
    ActionFailed {
        tool: String,
        #[source]
        source: ActionError,
    },

    /// 推理服务失败：中止当前调度，无部分结果
    #[error("Reasoner error: {0}")]
    Reasoner(#[from] LlmError),

    /// 推理器请求了菜单之外的原语
    #[error("{0} is not implemented")]
    UnknownCapability(String),

    /// 违反目标栈不变量（如没有长期目标时设置短期目标）
    #[error("Goal stack error: {0}")]
    GoalStack(String),

    /// 感知刷新等非调度路径上的协作者失败
    #[error("World error: {0}")]
    World(#[from] ActionError),

    #[error("Planning error: {0}")]
    Planning(String),

    /// Agent 间消息投递失败
    #[error("Message delivery failed: {0}")]
    Delivery(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将诊断写回 transcript，继续下一个调用
    Diagnose(String),
    /// 诊断 + 静态知识提示（缺前置材料）
    DiagnoseWithHint { diagnostic: String, hint: String },
    /// 终止当前调度
    Abort,
}
