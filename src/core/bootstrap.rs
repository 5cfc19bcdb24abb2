//! 启动准备：会话记录、种子任务、polling 触发器

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::core::error::AgentResult;
use crate::core::session::SessionScope;
use crate::store::RecordStore;
use crate::tasks::{NewTask, TaskManager};
use crate::triggers::{Trigger, TriggerKind, TriggerManager};

pub const POLLING_TRIGGER_ID: &str = "polling-default";

/// bootstrap 做了哪些事
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub session_created: bool,
    pub tasks_seeded: usize,
    pub polling_created: bool,
}

/// 确保会话记录存在
pub async fn ensure_session(
    sessions: &dyn RecordStore,
    scope: &SessionScope,
    agent_name: &str,
) -> AgentResult<bool> {
    let existing = sessions.list_by_scope(&scope.room_id).await?;
    if existing.iter().any(|r| r.content_str("kind") == Some("session")) {
        return Ok(false);
    }
    let record = scope.record(json!({
        "kind": "session",
        "text": format!("Session for {agent_name}"),
        "roomId": scope.room_id,
        "userId": scope.user_id,
        "userName": scope.user_name,
        "agentId": scope.agent_id,
    }));
    sessions.create(record).await?;
    info!(room_id = %scope.room_id, "Session created");
    Ok(true)
}

/// 会话、任务队列（为空时写入种子）、唯一的 polling 触发器
pub async fn bootstrap(
    sessions: &dyn RecordStore,
    scope: &SessionScope,
    agent_name: &str,
    tasks: &Arc<TaskManager>,
    triggers: &Arc<TriggerManager>,
    seed: Vec<NewTask>,
    polling_interval_ms: i64,
) -> AgentResult<BootstrapReport> {
    let mut report = BootstrapReport {
        session_created: ensure_session(sessions, scope, agent_name).await?,
        ..BootstrapReport::default()
    };

    if tasks.get_all_tasks().await?.is_empty() {
        report.tasks_seeded = tasks.seed_tasks(seed).await?.len();
        info!(count = report.tasks_seeded, "Seeded initial tasks");
    }

    if triggers.get_triggers_by_type(&TriggerKind::Polling).await?.is_empty() {
        report.polling_created = triggers
            .add_trigger(Trigger::polling(POLLING_TRIGGER_ID, polling_interval_ms))
            .await?
            .is_some();
    }
    Ok(report)
}
