//! Forager - 具身智能体认知核心
//!
//! 模块划分：
//! - **actions**: 封闭的原语菜单（类型化调用 + JSON Schema）、原语执行器、静态配方知识
//! - **agent**: 从配置装配一个 Agent 实例
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 共享状态、事件日志、目标栈、认知控制器（快慢双循环）、消息中枢、错误与恢复
//! - **llm**: 推理器客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化）
//! - **memory**: 短期（LRU）/ 长期 / 位置记忆，调度 transcript 消息类型
//! - **observability**: tracing 初始化
//! - **planning**: 目标分解引擎（任务树、预计背包）
//! - **react**: Planner 与调度主循环
//! - **world**: 感知 / 行动协作者接口、感知刷新、扫描 worker、内存模拟世界

pub mod actions;
pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod react;
pub mod world;

pub use agent::{create_llm_from_config, Agent, AgentCore};
