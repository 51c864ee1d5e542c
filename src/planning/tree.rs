//! 目标分解引擎：增量构建任务树
//!
//! 前沿（BFS 用队列、DFS 用栈）以根节点为种子，循环直到前沿为空：
//! 非根节点先问推理器「能否由单个原语完成」，能则追加一个带调用的叶子（预计背包叠加产出）；
//! 否则带上已规划上下文请求拆分，每个子步骤成为一个子节点（继承父节点预计背包的副本）。
//! 每次结果列表变化后都用完整列表调用进度回调。

use std::collections::{BTreeMap, VecDeque};

use uuid::Uuid;

use crate::core::{AgentError, AmbientSnapshot};
use crate::llm::LlmClient;
use crate::planning::node::{TaskNode, Traversal};
use crate::planning::{inventory, prompts};

/// 树规模上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    /// 达到此深度的节点不再拆分（自然叶子）
    pub max_depth: usize,
    /// 结果列表达到此长度后停止展开
    pub max_nodes: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_nodes: 200,
        }
    }
}

/// 已规划上下文：深度不超过 depth、序号早于 seq 的节点，按父节点分组
pub fn planned_context(nodes: &[TaskNode], depth: usize, seq: u64) -> String {
    let steps: BTreeMap<Uuid, &str> = nodes.iter().map(|n| (n.id, n.step.as_str())).collect();
    let mut groups: Vec<(Uuid, Vec<String>)> = Vec::new();
    for node in nodes.iter().filter(|n| n.depth <= depth && n.seq < seq) {
        let Some(parent) = node.parent else {
            continue;
        };
        let line = match &node.resolved_call {
            Some(call) => format!("- {} => {}", node.step, call.signature()),
            None => format!("- {}", node.step),
        };
        match groups.iter_mut().find(|(id, _)| *id == parent) {
            Some((_, lines)) => lines.push(line),
            None => groups.push((parent, vec![line])),
        }
    }
    if groups.is_empty() {
        return "(nothing yet)".to_string();
    }
    groups
        .into_iter()
        .map(|(parent, lines)| {
            let title = steps.get(&parent).copied().unwrap_or("?");
            format!("Under \"{title}\":\n{}", lines.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 构建任务树，返回扁平节点列表（父节点总在子节点之前）
pub async fn build_goal_tree<F>(
    llm: &dyn LlmClient,
    goal: &str,
    mode: Traversal,
    mut on_progress: F,
    ambient: &AmbientSnapshot,
    limits: TreeLimits,
) -> Result<Vec<TaskNode>, AgentError>
where
    F: FnMut(&[TaskNode]),
{
    let mut nodes = vec![TaskNode::root(goal.trim())];
    on_progress(&nodes);

    let mut frontier: VecDeque<usize> = VecDeque::from([0]);
    let mut next_seq: u64 = 1;

    loop {
        let popped = match mode {
            Traversal::BreadthFirst => frontier.pop_front(),
            Traversal::DepthFirst => frontier.pop_back(),
        };
        let Some(index) = popped else {
            break;
        };
        if nodes.len() >= limits.max_nodes {
            tracing::warn!(nodes = nodes.len(), "goal tree node limit reached, returning partial tree");
            break;
        }
        let node = nodes[index].clone();

        if !node.is_root() {
            let reply = llm.complete(&prompts::match_messages(&node.step, ambient)).await?;
            if let Some(call) = prompts::parse_match(&reply) {
                tracing::debug!(step = %node.step, call = %call, "step resolved");
                let projected = inventory::project(&node.projected_inventory, &call);
                let mut leaf = TaskNode::child(&node, node.step.clone(), next_seq);
                leaf.resolved_call = Some(call);
                leaf.projected_inventory = projected;
                next_seq += 1;
                nodes.push(leaf);
                on_progress(&nodes);
                continue;
            }
        }

        if node.depth >= limits.max_depth {
            tracing::debug!(step = %node.step, depth = node.depth, "depth limit, left as natural leaf");
            continue;
        }

        let context = planned_context(&nodes, node.depth, node.seq);
        let reply = llm
            .complete(&prompts::decompose_messages(
                &node.step,
                &context,
                &node.projected_inventory,
                ambient,
            ))
            .await?;
        let mut substeps = prompts::parse_substeps(&reply);
        if substeps.is_empty() {
            tracing::debug!(step = %node.step, "no substeps, natural leaf");
            continue;
        }
        substeps.truncate(limits.max_nodes.saturating_sub(nodes.len()));

        let first_child = nodes.len();
        for step in substeps {
            nodes.push(TaskNode::child(&node, step, next_seq));
            next_seq += 1;
        }
        on_progress(&nodes);

        let children = first_child..nodes.len();
        match mode {
            Traversal::BreadthFirst => frontier.extend(children),
            // 逆序入栈，第一个子步骤最先弹出
            Traversal::DepthFirst => frontier.extend(children.rev()),
        }
    }

    tracing::info!(goal = %goal, nodes = nodes.len(), mode = %mode, "goal tree built");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FnLlmClient;

    #[test]
    fn test_planned_context_groups_by_parent() {
        let root = TaskNode::root("goal");
        let a = TaskNode::child(&root, "first", 1);
        let b = TaskNode::child(&root, "second", 2);
        let a1 = TaskNode::child(&a, "first.1", 3);
        let nodes = vec![root, a, b, a1];

        assert_eq!(planned_context(&nodes, 0, 0), "(nothing yet)");
        assert_eq!(planned_context(&nodes, 1, 2), "Under \"goal\":\n- first");
        let ctx = planned_context(&nodes, 2, 4);
        assert!(ctx.contains("Under \"goal\":\n- first\n- second"));
        assert!(ctx.contains("Under \"first\":\n- first.1"));
    }

    #[tokio::test]
    async fn test_root_is_never_matched() {
        let llm = FnLlmClient::new(|messages| {
            if messages[0].content.starts_with(prompts::MATCH_HEADER) {
                Ok("chat(hello)".to_string())
            } else {
                Ok("NONE".to_string())
            }
        });
        let nodes = build_goal_tree(
            &llm,
            "chat(hello)",
            Traversal::BreadthFirst,
            |_| {},
            &AmbientSnapshot::default(),
            TreeLimits::default(),
        )
        .await
        .unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].resolved_call.is_none());
    }

    #[tokio::test]
    async fn test_node_limit_returns_partial_tree() {
        let llm = FnLlmClient::new(|messages| {
            if messages[0].content.starts_with(prompts::MATCH_HEADER) {
                Ok("NONE".to_string())
            } else {
                Ok("a\nb\nc".to_string())
            }
        });
        let mut reported = 0;
        let nodes = build_goal_tree(
            &llm,
            "grow forever",
            Traversal::BreadthFirst,
            |list| reported = list.len(),
            &AmbientSnapshot::default(),
            TreeLimits {
                max_depth: 10,
                max_nodes: 8,
            },
        )
        .await
        .unwrap();
        assert_eq!(nodes.len(), 8);
        assert_eq!(reported, 8);
    }

    #[tokio::test]
    async fn test_reasoner_failure_propagates() {
        let llm = FnLlmClient::new(|_| Err(crate::llm::LlmError::Request("down".into())));
        let err = build_goal_tree(
            &llm,
            "anything",
            Traversal::DepthFirst,
            |_| {},
            &AmbientSnapshot::default(),
            TreeLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Reasoner(_)));
    }
}
