//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TASKLOOP__*` 覆盖（双下划线表示嵌套，如 `TASKLOOP__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub iteration: IterationSection,
    pub triggers: TriggersSection,
    pub store: StoreSection,
    pub tasks: TasksSection,
}

/// [app] 段：智能体身份与会话房间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub agent_id: String,
    pub user_name: String,
    /// 房间名，未设置时为 default-room-<agent_id>
    pub room: Option<String>,
    /// system prompt 文件路径
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Trader".to_string(),
            agent_id: "trader".to_string(),
            user_name: "Admin".to_string(),
            room: None,
            system_prompt_file: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；是否真正调用远端还取决于 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// 两轮迭代之间的等待方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    #[default]
    Sleep,
    Manual,
}

/// [iteration] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IterationSection {
    pub mode: PacingMode,
    /// sleep 模式下的间隔（毫秒）
    pub interval_ms: u64,
    /// 上下文中保留的最近对话条数
    pub recent_messages: usize,
}

impl Default for IterationSection {
    fn default() -> Self {
        Self {
            mode: PacingMode::Sleep,
            interval_ms: 5000,
            recent_messages: 20,
        }
    }
}

/// [triggers] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    /// bootstrap 创建 polling 触发器时的间隔（毫秒）
    pub polling_interval_ms: i64,
}

impl Default for TriggersSection {
    fn default() -> Self {
        Self {
            polling_interval_ms: crate::triggers::DEFAULT_INTERVAL_MS,
        }
    }
}

/// [store] 段：dir 为空时使用内存存储
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSection {
    pub dir: Option<PathBuf>,
}

/// [tasks] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TasksSection {
    pub seed: Vec<SeedTask>,
}

/// [[tasks.seed]] 项
#[derive(Debug, Clone, Deserialize)]
pub struct SeedTask {
    pub id: String,
    pub description: String,
    pub definition_of_done: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub trigger_types: Vec<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// 从 config 目录加载配置，环境变量 TASKLOOP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TASKLOOP__*（双下划线表示嵌套键）
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
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TASKLOOP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.iteration.mode, PacingMode::Sleep);
        assert_eq!(cfg.iteration.interval_ms, 5000);
        assert_eq!(cfg.triggers.polling_interval_ms, 5000);
        assert_eq!(cfg.app.agent_id, "trader");
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert!(cfg.store.dir.is_none());
        assert!(cfg.tasks.seed.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
agent_id = "desk"

[iteration]
mode = "manual"
recent_messages = 5

[[tasks.seed]]
id = "watch"
description = "Watch the book"
definition_of_done = "Summary noted"
trigger_types = ["dynamic"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.agent_id, "desk");
        assert_eq!(cfg.app.user_name, "Admin");
        assert_eq!(cfg.iteration.mode, PacingMode::Manual);
        assert_eq!(cfg.iteration.recent_messages, 5);
        assert_eq!(cfg.iteration.interval_ms, 5000);
        assert_eq!(cfg.tasks.seed.len(), 1);
        assert_eq!(cfg.tasks.seed[0].trigger_types, vec!["dynamic".to_string()]);
    }
}
