//! 任务树节点与遍历方式

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::PrimitiveCall;

/// 前沿的遍历方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// 队列：同一深度的节点全部展开后才展开下一层
    #[default]
    BreadthFirst,
    /// 栈：一个节点的全部后代展开完才轮到它的兄弟
    DepthFirst,
}

impl FromStr for Traversal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "bfs" | "breadth_first" | "breadth" => Ok(Self::BreadthFirst),
            "dfs" | "depth_first" | "depth" => Ok(Self::DepthFirst),
            other => Err(format!("unknown traversal: {other}")),
        }
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BreadthFirst => f.write_str("breadth_first"),
            Self::DepthFirst => f.write_str("depth_first"),
        }
    }
}

/// 任务树节点：追加到结果列表后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub id: Uuid,
    /// 只有根节点为 None
    pub parent: Option<Uuid>,
    pub step: String,
    /// 非空即叶子
    pub resolved_call: Option<PrimitiveCall>,
    pub depth: usize,
    /// 全局严格递增
    pub seq: u64,
    /// 预计背包：沿根到叶只增不减
    pub projected_inventory: BTreeMap<String, u32>,
}

impl TaskNode {
    pub fn root(goal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: None,
            step: goal.into(),
            resolved_call: None,
            depth: 0,
            seq: 0,
            projected_inventory: BTreeMap::new(),
        }
    }

    /// 子步骤节点：继承父节点预计背包的副本
    pub fn child(parent: &TaskNode, step: impl Into<String>, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: Some(parent.id),
            step: step.into(),
            resolved_call: None,
            depth: parent.depth + 1,
            seq,
            projected_inventory: parent.projected_inventory.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_call.is_some()
    }
}

/// 缩进文本形式（CLI 打印）
pub fn render_tree(nodes: &[TaskNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        let indent = "  ".repeat(node.depth);
        match &node.resolved_call {
            Some(call) => out.push_str(&format!("{indent}#{} => {}\n", node.seq, call.signature())),
            None => out.push_str(&format!("{indent}#{} {}\n", node.seq, node.step)),
        }
    }
    out
}
