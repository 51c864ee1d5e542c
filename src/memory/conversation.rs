//! 对话消息：调度 transcript 与推理请求共用的消息类型
//!
//! 一次调度循环内 transcript 只增不减，循环结束即丢弃；Role 与 LLM API 角色一一对应（tool 为工具结果）。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// 工具调用结果 / 诊断
    Tool,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// 取最后一条 User 消息内容（mock / 脚本化推理器用它判断请求类型）
pub fn last_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::tool("ok")).unwrap();
        assert!(json.contains("\"tool\""));
    }

    #[test]
    fn test_last_user_content() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::tool("result"),
        ];
        assert_eq!(last_user_content(&msgs), Some("second"));
        assert_eq!(last_user_content(&[Message::system("x")]), None);
    }
}
