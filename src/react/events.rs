//! 调度过程事件：推送给观察者（CLI 打印、前端展示）

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// 新一轮开始
    RoundStarted { round: usize, max_rounds: usize },
    /// 注入了中断消息（如正在被攻击）
    Interrupt { message: String },
    /// 正在请求推理器
    Thinking,
    /// 推理器请求调用原语
    Invocation { tool: String, args: String },
    /// 原语返回（预览）
    Observation { tool: String, preview: String },
    /// 写回 transcript 的诊断（解析错误 / 原语失败 / 未知原语）
    Diagnostic { tool: String, text: String },
    /// 推理器不再调用原语，调度结束
    Finished { response: String, rounds: usize },
    /// 轮数用尽
    RoundLimit { rounds: usize },
    Error { text: String },
}
