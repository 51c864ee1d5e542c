//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__DISPATCH__MAX_ROUNDS=30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::actions::ExecutorConfig;
use crate::core::ControllerConfig;
use crate::llm::RetryConfig;
use crate::memory::DEFAULT_SHORT_TERM_CAPACITY;
use crate::planning::{Traversal, TreeLimits};
use crate::react::MAX_DISPATCH_ROUNDS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub controller: ControllerConfig,
    pub dispatch: DispatchSection,
    pub planning: PlanningSection,
    pub memory: MemorySection,
    pub actions: ActionsSection,
    pub event_log: EventLogSection,
}

/// [agent] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    /// 覆盖默认 system prompt 的文件
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "forager".to_string(),
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / mock；有无 API Key 共同决定实际后端
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            request_timeout_secs: 60,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl LlmSection {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// [dispatch] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_rounds: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_rounds: MAX_DISPATCH_ROUNDS,
        }
    }
}

/// [planning] 段：任务树遍历方式与规模上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    /// bfs / dfs
    pub traversal: String,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for PlanningSection {
    fn default() -> Self {
        let limits = TreeLimits::default();
        Self {
            traversal: "bfs".to_string(),
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
        }
    }
}

impl PlanningSection {
    /// 无法识别时回退到广度优先
    pub fn traversal(&self) -> Traversal {
        self.traversal.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, using breadth-first", e);
            Traversal::BreadthFirst
        })
    }

    pub fn limits(&self) -> TreeLimits {
        TreeLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes.max(1),
        }
    }
}

/// [memory] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub short_term_capacity: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            short_term_capacity: DEFAULT_SHORT_TERM_CAPACITY,
        }
    }
}

/// [actions] 段：原语超时与寻路重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionsSection {
    pub timeout_secs: u64,
    pub pathfind_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ActionsSection {
    fn default() -> Self {
        let exec = ExecutorConfig::default();
        Self {
            timeout_secs: exec.timeout.as_secs(),
            pathfind_retries: exec.pathfind_retries,
            retry_backoff_ms: exec.retry_backoff.as_millis() as u64,
        }
    }
}

impl ActionsSection {
    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            pathfind_retries: self.pathfind_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// [event_log] 段：设置 path 时每条记录追加写入 JSONL 文件
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventLogSection {
    pub path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录警告并回退到默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
