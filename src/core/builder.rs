//! Agent 构建器：从配置组装存储、LLM、各 Manager 与编排器

use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, LlmSection};
use crate::core::actions::MessageLog;
use crate::core::bootstrap::{bootstrap, BootstrapReport};
use crate::core::context::ContextComposer;
use crate::core::error::{AgentError, AgentResult};
use crate::core::iteration::{AgentRuntime, Orchestrator};
use crate::core::session::SessionScope;
use crate::llm::{CompletionService, LlmClient, LlmCompletionService, MockLlmClient, OpenAiClient};
use crate::notes::NoteManager;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::store::{InMemoryRecordStore, JsonlRecordStore, RecordStore, StoreError};
use crate::tasks::{seed_tasks_from_config, TaskManager};
use crate::triggers::TriggerManager;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// [llm] 段解析出的后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    Mock,
    /// OpenAI 兼容端点；base_url 为 None 时用 OpenAI 官方地址
    Remote {
        base_url: Option<String>,
        api_key: String,
    },
}

/// 按 provider 选择端点与 API Key 环境变量；缺 Key 或 provider 未知时退回 Mock
pub fn resolve_backend(llm: &LlmSection, env: impl Fn(&str) -> Option<String>) -> LlmBackend {
    let (default_url, key_var) = match llm.provider.trim().to_lowercase().as_str() {
        "mock" => return LlmBackend::Mock,
        "deepseek" => (Some(DEEPSEEK_BASE_URL), "DEEPSEEK_API_KEY"),
        "openai" => (None, "OPENAI_API_KEY"),
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, using Mock LLM");
            return LlmBackend::Mock;
        }
    };
    match env(key_var).filter(|k| !k.trim().is_empty()) {
        Some(api_key) => LlmBackend::Remote {
            base_url: llm.base_url.clone().or(default_url.map(String::from)),
            api_key,
        },
        None => {
            tracing::warn!(key = key_var, "API key not set, using Mock LLM");
            LlmBackend::Mock
        }
    }
}

/// 根据配置与环境变量创建 LLM 客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match resolve_backend(&cfg.llm, |key| std::env::var(key).ok()) {
        LlmBackend::Mock => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        LlmBackend::Remote { base_url, api_key } => {
            tracing::info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "Using remote LLM");
            Arc::new(
                OpenAiClient::new(base_url.as_deref(), &cfg.llm.model, Some(api_key.as_str()))
                    .with_request_timeout(cfg.llm.timeouts.request),
            )
        }
    }
}

/// 五张表
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn RecordStore>,
    pub triggers: Arc<dyn RecordStore>,
    pub notes: Arc<dyn RecordStore>,
    pub messages: Arc<dyn RecordStore>,
    pub sessions: Arc<dyn RecordStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            tasks: Arc::new(InMemoryRecordStore::new("tasks")),
            triggers: Arc::new(InMemoryRecordStore::new("triggers")),
            notes: Arc::new(InMemoryRecordStore::new("notes")),
            messages: Arc::new(InMemoryRecordStore::new("messages")),
            sessions: Arc::new(InMemoryRecordStore::new("sessions")),
        }
    }

    pub async fn open_jsonl(dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            tasks: Arc::new(JsonlRecordStore::open(dir, "tasks").await?),
            triggers: Arc::new(JsonlRecordStore::open(dir, "triggers").await?),
            notes: Arc::new(JsonlRecordStore::open(dir, "notes").await?),
            messages: Arc::new(JsonlRecordStore::open(dir, "messages").await?),
            sessions: Arc::new(JsonlRecordStore::open(dir, "sessions").await?),
        })
    }
}

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    stores: Option<Stores>,
    system_prompt: Option<String>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            stores: None,
            system_prompt: None,
        }
    }

    /// 指定 LLM 客户端（测试中注入 Mock）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    /// 配置文件中的 system prompt，读取失败时用默认值
    fn resolve_system_prompt(&self) -> String {
        if let Some(prompt) = &self.system_prompt {
            return prompt.clone();
        }
        self.config
            .app
            .system_prompt_file
            .as_ref()
            .and_then(|p| match std::fs::read_to_string(p) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to read system prompt {}: {}", p.display(), e);
                    None
                }
            })
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub async fn build(self) -> AgentResult<Agent> {
        let system_prompt = self.resolve_system_prompt();
        let AgentBuilder {
            config, llm, stores, ..
        } = self;

        let stores = match stores {
            Some(stores) => stores,
            None => match &config.store.dir {
                Some(dir) => Stores::open_jsonl(dir).await?,
                None => Stores::in_memory(),
            },
        };
        let llm = llm.unwrap_or_else(|| create_llm_from_config(&config));
        let completion: Arc<dyn CompletionService> =
            Arc::new(LlmCompletionService::new(llm.clone(), system_prompt));

        if config.app.agent_id.trim().is_empty() {
            return Err(AgentError::Config("app.agent_id must not be empty".into()));
        }
        let scope = SessionScope::new(
            &config.app.agent_id,
            &config.app.user_name,
            config.app.room.as_deref(),
        );

        let tasks = Arc::new(TaskManager::new(stores.tasks.clone(), scope.clone(), completion.clone()));
        let triggers = Arc::new(TriggerManager::new(
            stores.triggers.clone(),
            scope.clone(),
            completion.clone(),
        ));
        let notes = Arc::new(NoteManager::new(stores.notes.clone(), scope.clone(), completion.clone()));
        let composer = Arc::new(ContextComposer::new(
            config.app.name.clone(),
            scope.clone(),
            tasks.clone(),
            triggers.clone(),
            notes.clone(),
            stores.messages.clone(),
            config.iteration.recent_messages,
        ));

        let runtime = AgentRuntime {
            agent_name: config.app.name.clone(),
            tasks,
            triggers,
            notes,
            messages: MessageLog::new(stores.messages.clone(), scope.clone()),
            completion,
            composer,
        };
        Ok(Agent {
            config,
            scope,
            stores,
            llm,
            runtime,
        })
    }
}

/// 组装完成的 Agent
pub struct Agent {
    pub config: AppConfig,
    pub scope: SessionScope,
    pub stores: Stores,
    pub llm: Arc<dyn LlmClient>,
    pub runtime: AgentRuntime,
}

impl Agent {
    /// 会话、种子任务、polling 触发器
    pub async fn bootstrap(&self) -> AgentResult<BootstrapReport> {
        bootstrap(
            self.stores.sessions.as_ref(),
            &self.scope,
            &self.runtime.agent_name,
            &self.runtime.tasks,
            &self.runtime.triggers,
            seed_tasks_from_config(&self.config.tasks.seed),
            self.config.triggers.polling_interval_ms,
        )
        .await
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.runtime.clone())
    }

    /// 累计 token：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}
