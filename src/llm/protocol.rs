//! 文本调用协议：让只会输出文本的推理器也能请求原语调用
//!
//! 请求侧：把原语菜单（名称、描述、参数 schema）与调用格式拼进 system 消息。
//! 回复侧：从文本中提取 JSON（```json 块 / 裸对象 / 数组），解析为 Invocation 列表；
//! 外层 JSON 损坏但能认出工具名时仍生成调用，参数原样保留，交给调度循环报告解析错误。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::llm::{Invocation, LlmReply, ToolSpec};
use crate::memory::{Message, Role};

/// 调用格式说明（拼入 system 消息）
pub const TOOL_PROTOCOL: &str = "\
To invoke a tool, reply with exactly one JSON object and nothing else:
{\"tool\": \"<tool name>\", \"args\": {<arguments matching the tool's parameters>}}
Invoke at most one tool per reply. When the task is finished or no tool is needed, reply with plain text only.";

/// 回复中单个调用的形状：{"tool": "mine", "args": {...}}
#[derive(Debug, Deserialize)]
struct ToolCallFormat {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// 渲染原语菜单段落
pub fn render_tool_section(tools: &[ToolSpec]) -> String {
    let listing: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();
    let json = serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string());
    format!("## Available tools\n{json}\n\n{TOOL_PROTOCOL}")
}

/// 把工具段落并入第一条 system 消息；没有 system 消息时在最前插入一条
pub fn with_tool_instructions(messages: &[Message], tools: &[ToolSpec]) -> Vec<Message> {
    if tools.is_empty() {
        return messages.to_vec();
    }
    let section = render_tool_section(tools);
    let mut out = messages.to_vec();
    match out.iter_mut().find(|m| m.role == Role::System) {
        Some(sys) => {
            sys.content = format!("{}\n\n{}", sys.content, section);
        }
        None => out.insert(0, Message::system(section)),
    }
    out
}

fn tool_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""tool"\s*:\s*"([^"]+)""#).expect("valid tool-name pattern"))
}

/// 提取回复中的 JSON 片段与它前面的说明文字
fn extract_json(trimmed: &str) -> Option<(&str, &str)> {
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some((trimmed[..start].trim(), body.trim()));
    }
    let obj = trimmed.find('{');
    let arr = trimmed.find('[').filter(|a| obj.map_or(true, |o| *a < o));
    let (start, close) = match (arr, obj) {
        (Some(a), _) => (a, ']'),
        (None, Some(o)) => (o, '}'),
        (None, None) => return None,
    };
    let end = trimmed.rfind(close).filter(|e| *e > start)?;
    Some((trimmed[..start].trim(), &trimmed[start..=end]))
}

fn to_invocation(index: usize, call: ToolCallFormat) -> Invocation {
    let arguments = match call.args {
        serde_json::Value::Null => "{}".to_string(),
        // 推理器有时把参数编码成字符串，原样交给解析
        serde_json::Value::String(raw) => raw,
        other => other.to_string(),
    };
    Invocation {
        id: format!("call_{index}"),
        name: call.tool,
        arguments,
    }
}

/// 解析推理器回复为文本 + 调用列表
pub fn parse_reply(output: &str) -> LlmReply {
    let trimmed = output.trim();
    let Some((preamble, json_str)) = extract_json(trimmed) else {
        return LlmReply::text(trimmed);
    };

    if let Ok(call) = serde_json::from_str::<ToolCallFormat>(json_str) {
        if call.tool.trim().is_empty() {
            return LlmReply::text(trimmed);
        }
        return LlmReply {
            text: preamble.to_string(),
            invocations: vec![to_invocation(0, call)],
        };
    }

    if let Ok(calls) = serde_json::from_str::<Vec<ToolCallFormat>>(json_str) {
        let invocations: Vec<Invocation> = calls
            .into_iter()
            .filter(|c| !c.tool.trim().is_empty())
            .enumerate()
            .map(|(i, c)| to_invocation(i, c))
            .collect();
        if invocations.is_empty() {
            return LlmReply::text(trimmed);
        }
        return LlmReply {
            text: preamble.to_string(),
            invocations,
        };
    }

    // 外层 JSON 损坏：认得出工具名就生成调用，参数取 "args" 之后的原文
    if let Some(c) = tool_name_pattern().captures(json_str) {
        let name = c[1].to_string();
        let arguments = json_str
            .find("\"args\"")
            .and_then(|i| json_str[i..].find(':').map(|j| i + j + 1))
            .map(|i| json_str[i..].trim().trim_end_matches('}').trim().to_string())
            .unwrap_or_default();
        return LlmReply {
            text: preamble.to_string(),
            invocations: vec![Invocation {
                id: "call_0".to_string(),
                name,
                arguments,
            }],
        };
    }

    LlmReply::text(trimmed)
}
