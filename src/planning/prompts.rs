//! 目标分解的两类请求与回复解析
//!
//! - 匹配：这一步能否由菜单中的单个原语完成？回复 `name(args)` 或 NONE
//! - 拆分：把一步拆成有序子步骤，每行一个；回复 NONE 表示无法再拆
//!
//! 两类请求的 system 消息以不同标题开头，便于确定性推理器桩区分。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::actions::{signature_menu, PrimitiveCall};
use crate::core::AmbientSnapshot;
use crate::memory::Message;
use crate::planning::inventory;

pub const MATCH_HEADER: &str = "## Primitive match";
pub const DECOMPOSE_HEADER: &str = "## Task breakdown";
/// 用户消息中步骤所在行的前缀
pub const STEP_PREFIX: &str = "Step: ";
/// 回复「没有」
pub const NONE_REPLY: &str = "NONE";

pub fn match_messages(step: &str, ambient: &AmbientSnapshot) -> Vec<Message> {
    let system = format!(
        "{MATCH_HEADER}\n\
         Decide whether the step below can be carried out by exactly ONE call to one of these actions:\n\
         {}\n\n\
         If it can, reply with only that call, e.g. mine(oak_log, 3). Fill in every argument.\n\
         If it needs more than one call, or none of the actions fit, reply with only {NONE_REPLY}.",
        signature_menu()
    );
    let user = format!(
        "{STEP_PREFIX}{step}\n\n## Current situation\n{}",
        ambient.to_prompt_section()
    );
    vec![Message::system(system), Message::user(user)]
}

pub fn decompose_messages(
    step: &str,
    context: &str,
    projected: &BTreeMap<String, u32>,
    ambient: &AmbientSnapshot,
) -> Vec<Message> {
    let system = format!(
        "{DECOMPOSE_HEADER}\n\
         Break the step below into a short ordered list of smaller substeps that together achieve it.\n\
         Write one substep per line, in execution order, with no commentary.\n\
         Do not repeat steps that are already planned, and skip acquiring items the plan already provides.\n\
         If the step cannot be broken down any further, reply with only {NONE_REPLY}."
    );
    let user = format!(
        "{STEP_PREFIX}{step}\n\n\
         ## Already planned\n{context}\n\n\
         ## Items the plan already provides\n{}\n\n\
         ## Current situation\n{}",
        inventory::render(projected),
        ambient.to_prompt_section()
    );
    vec![Message::system(system), Message::user(user)]
}

/// 从请求中取回步骤文本（推理器桩使用）
pub fn step_of(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .flat_map(|m| m.content.lines())
        .find_map(|line| line.strip_prefix(STEP_PREFIX))
        .map(str::trim)
}

fn list_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[-*•]\s*|\d+\s*[.):]\s*|(?i:step)\s*\d+\s*[.):]\s*)")
            .expect("valid list marker pattern")
    })
}

fn is_none(text: &str) -> bool {
    let t = text.trim().trim_end_matches('.').trim();
    t.eq_ignore_ascii_case(NONE_REPLY)
}

/// 子步骤列表：按行切分，去掉列表符号 / 编号，丢弃空行；NONE 表示零个子步骤
pub fn parse_substeps(output: &str) -> Vec<String> {
    if is_none(output) {
        return Vec::new();
    }
    output
        .lines()
        .map(|line| list_marker().replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty() && !is_none(line))
        .collect()
}

/// 匹配回复：恰好一行可识别的原语调用，否则 None（按「不匹配」处理）
///
/// 代码围栏行不计入；多于一行（例如列出了多个调用）一律视为不匹配。
pub fn parse_match(output: &str) -> Option<PrimitiveCall> {
    if is_none(output) {
        return None;
    }
    let mut lines = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"));
    let line = lines.next()?;
    if lines.next().is_some() {
        return None;
    }
    PrimitiveCall::parse_signature(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_substeps_strips_markers() {
        let out = "1. Mine 5 wood\n  2) Craft 4 wood planks\n\n- Craft 2 sticks\nStep 4: Craft 1 wooden pickaxe\n";
        assert_eq!(
            parse_substeps(out),
            vec!["Mine 5 wood", "Craft 4 wood planks", "Craft 2 sticks", "Craft 1 wooden pickaxe"]
        );
        assert!(parse_substeps("NONE").is_empty());
        assert!(parse_substeps("  none. ").is_empty());
        assert!(parse_substeps("   \n\n").is_empty());
    }

    #[test]
    fn test_parse_match() {
        assert_eq!(
            parse_match("mine(wood, 5)\n"),
            Some(PrimitiveCall::Mine { block: "wood".into(), count: 5 })
        );
        assert_eq!(parse_match("NONE"), None);
        assert_eq!(parse_match("You could mine some wood"), None);
        assert_eq!(
            parse_match("```\ncraft(stick, 4)\n```"),
            Some(PrimitiveCall::Craft { item: "stick".into(), amount: 4 })
        );
        assert_eq!(parse_match("mine(wood, 5)\ncraft(wood_planks, 4)"), None);
        assert_eq!(parse_match("mine(wood, 5, 9)"), None);
    }

    #[test]
    fn test_prompts_have_distinct_headers_and_step() {
        let ambient = AmbientSnapshot::default();
        let m = match_messages("Mine 5 wood", &ambient);
        let d = decompose_messages("Mine 5 wood", "(nothing yet)", &BTreeMap::new(), &ambient);
        assert!(m[0].content.starts_with(MATCH_HEADER));
        assert!(d[0].content.starts_with(DECOMPOSE_HEADER));
        assert_eq!(step_of(&m), Some("Mine 5 wood"));
        assert_eq!(step_of(&d), Some("Mine 5 wood"));
    }
}
