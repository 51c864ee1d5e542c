//! 目标分解：任务树构建、预计背包、请求渲染与回复解析、单层拆分

pub mod breakdown;
pub mod inventory;
pub mod node;
pub mod prompts;
pub mod tree;

pub use breakdown::breakdown;
pub use node::{render_tree, TaskNode, Traversal};
pub use tree::{build_goal_tree, planned_context, TreeLimits};
