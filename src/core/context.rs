//! 执行上下文：一轮迭代中各环节共享的状态快照

use std::sync::Arc;

use crate::core::error::AgentResult;
use crate::core::session::SessionScope;
use crate::notes::{Note, NoteManager};
use crate::store::{Record, RecordStore};
use crate::tasks::{current_of, Task, TaskManager};
use crate::triggers::{Trigger, TriggerEvaluation, TriggerManager};

/// 当前任务、全部任务、触发器、笔记与最近对话
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub agent_name: String,
    pub current_task: Option<Task>,
    pub tasks: Vec<Task>,
    pub triggers: Vec<Trigger>,
    pub notes: Vec<Note>,
    /// 按写入顺序，最多 recent_messages 条
    pub recent_messages: Vec<Record>,
    /// 本轮命中的触发器评估
    pub activation: Option<TriggerEvaluation>,
}

impl ExecutionContext {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            ..Self::default()
        }
    }

    pub fn notes_for_task<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a Note> + 'a {
        self.notes.iter().filter(move |n| n.task_id() == Some(task_id))
    }

    /// order 最大的已完成任务
    pub fn last_completed_task(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.is_completed())
            .max_by_key(|t| (t.order, t.created_at))
    }

    /// 尚未完成且不是当前任务的任务
    pub fn upcoming_tasks(&self) -> impl Iterator<Item = &Task> {
        let current = self.current_task.as_ref().map(|t| t.id.as_str());
        self.tasks
            .iter()
            .filter(move |t| !t.is_completed() && Some(t.id.as_str()) != current)
    }
}

/// 从各 Manager 与对话表组装 ExecutionContext
pub struct ContextComposer {
    agent_name: String,
    scope: SessionScope,
    tasks: Arc<TaskManager>,
    triggers: Arc<TriggerManager>,
    notes: Arc<NoteManager>,
    messages: Arc<dyn RecordStore>,
    recent_limit: usize,
}

impl ContextComposer {
    pub fn new(
        agent_name: impl Into<String>,
        scope: SessionScope,
        tasks: Arc<TaskManager>,
        triggers: Arc<TriggerManager>,
        notes: Arc<NoteManager>,
        messages: Arc<dyn RecordStore>,
        recent_limit: usize,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            scope,
            tasks,
            triggers,
            notes,
            messages,
            recent_limit,
        }
    }

    pub async fn compose(&self, activation: Option<TriggerEvaluation>) -> AgentResult<ExecutionContext> {
        let tasks = self.tasks.get_all_tasks().await?;
        let current_task = current_of(&tasks).cloned();
        let triggers = self.triggers.get_all_triggers().await?;
        let notes = self.notes.get_all_notes().await?;

        let mut recent_messages = self.messages.list_by_scope(&self.scope.room_id).await?;
        let skip = recent_messages.len().saturating_sub(self.recent_limit);
        recent_messages.drain(..skip);

        Ok(ExecutionContext {
            agent_name: self.agent_name.clone(),
            current_task,
            tasks,
            triggers,
            notes,
            recent_messages,
            activation,
        })
    }
}
