//! 任务队列管理：增删改查、当前任务派生、完成判定
//!
//! 所有写入经过 `replace_record`（先追加再压缩），读取经过 `materialize_latest`，
//! 因此同一 task id 在物化视图中始终恰有一条记录。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::core::context::ExecutionContext;
use crate::core::error::{AgentError, AgentResult};
use crate::core::session::SessionScope;
use crate::llm::{generate_object, CompletionService};
use crate::prompts;
use crate::store::{materialize_latest, replace_record, Record, RecordStore};
use crate::tasks::types::{current_of, NewTask, Task, TaskStatus};

const KIND: &str = "task";

/// tasks 表中一条记录的 content
#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    kind: String,
    text: String,
    #[serde(flatten)]
    task: Task,
}

fn key_of(record: &Record) -> Option<String> {
    (record.content_str("kind") == Some(KIND))
        .then(|| record.content_str("id").map(String::from))
        .flatten()
}

/// 完成判定结果
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionVerdict {
    pub is_complete: bool,
    #[serde(default)]
    pub reason: String,
}

pub struct TaskManager {
    store: Arc<dyn RecordStore>,
    scope: SessionScope,
    completion: Arc<dyn CompletionService>,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scope: SessionScope,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            store,
            scope,
            completion,
        }
    }

    /// 全部任务，按 order 升序
    pub async fn get_all_tasks(&self) -> AgentResult<Vec<Task>> {
        let records = self.store.list_by_scope(&self.scope.room_id).await?;
        let mut tasks = materialize_latest(records, key_of)
            .into_iter()
            .map(|r| serde_json::from_value::<TaskRecord>(r.content).map(|tr| tr.task))
            .collect::<Result<Vec<_>, _>>()?;
        tasks.sort_by_key(|t| (t.order, t.created_at));
        Ok(tasks)
    }

    pub async fn get_task(&self, id: &str) -> AgentResult<Option<Task>> {
        Ok(self.get_all_tasks().await?.into_iter().find(|t| t.id == id))
    }

    /// 当前任务：order 最小的未完成任务
    pub async fn current_task(&self) -> AgentResult<Option<Task>> {
        let tasks = self.get_all_tasks().await?;
        Ok(current_of(&tasks).cloned())
    }

    /// 新增任务；未指定 order 时追加到队尾（空队列为 0）
    pub async fn add_task(&self, new_task: NewTask) -> AgentResult<Task> {
        if new_task.id.trim().is_empty() {
            return Err(AgentError::Validation("task id must not be empty".into()));
        }
        if new_task.description.trim().is_empty() {
            return Err(AgentError::Validation(format!(
                "task {} has an empty description",
                new_task.id
            )));
        }

        let tasks = self.get_all_tasks().await?;
        if tasks.iter().any(|t| t.id == new_task.id) {
            return Err(AgentError::Validation(format!(
                "task {} already exists",
                new_task.id
            )));
        }
        let order = match new_task.order {
            Some(order) => {
                if let Some(other) = tasks.iter().find(|t| t.order == order) {
                    return Err(AgentError::Validation(format!(
                        "order {} is already taken by task {}",
                        order, other.id
                    )));
                }
                order
            }
            None => tasks.iter().map(|t| t.order).max().map_or(0, |max| max + 1),
        };

        let task = Task {
            id: new_task.id,
            description: new_task.description,
            definition_of_done: new_task.definition_of_done,
            status: TaskStatus::Pending,
            trigger_types: new_task.trigger_types,
            order,
            data: new_task.data,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.write(&task).await?;
        info!(task_id = %task.id, order, "Task added");
        Ok(task)
    }

    /// 替换任务的持久化记录；completed 为终态，不能回退
    pub async fn update_task(&self, task: &Task) -> AgentResult<Task> {
        let tasks = self.get_all_tasks().await?;
        let existing = tasks
            .iter()
            .find(|t| t.id == task.id)
            .ok_or_else(|| AgentError::NotFound(format!("task {}", task.id)))?;
        if existing.is_completed() && !task.is_completed() {
            return Err(AgentError::Validation(format!(
                "task {} is completed and cannot move back to {}",
                task.id,
                task.status.as_str()
            )));
        }
        if let Some(other) = tasks.iter().find(|t| t.id != task.id && t.order == task.order) {
            return Err(AgentError::Validation(format!(
                "order {} is already taken by task {}",
                task.order, other.id
            )));
        }

        self.write(task).await?;
        debug!(task_id = %task.id, status = task.status.as_str(), "Task updated");
        Ok(task.clone())
    }

    pub async fn start_task(&self, task: &Task) -> AgentResult<Task> {
        let started = self.update_task(&task.with_status(TaskStatus::InProgress)).await?;
        info!(task_id = %task.id, "Task started");
        Ok(started)
    }

    pub async fn complete_task(&self, task: &Task) -> AgentResult<Task> {
        let completed = self.update_task(&task.with_status(TaskStatus::Completed)).await?;
        info!(task_id = %task.id, "Task completed");
        Ok(completed)
    }

    /// 依次新增一组任务
    pub async fn seed_tasks(&self, tasks: Vec<NewTask>) -> AgentResult<Vec<Task>> {
        let mut added = Vec::with_capacity(tasks.len());
        for task in tasks {
            added.push(self.add_task(task).await?);
        }
        Ok(added)
    }

    /// 询问补全服务任务是否已满足完成定义；服务失败视为未完成
    pub async fn evaluate_task_completion(&self, task: &Task, context: &ExecutionContext) -> bool {
        let prompt = prompts::task_completion_prompt(task, context);
        match generate_object::<CompletionVerdict>(self.completion.as_ref(), &prompt).await {
            Ok(verdict) => {
                info!(
                    task_id = %task.id,
                    complete = verdict.is_complete,
                    reason = %verdict.reason,
                    "Task completion evaluated"
                );
                verdict.is_complete
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Task completion evaluation failed");
                false
            }
        }
    }

    async fn write(&self, task: &Task) -> AgentResult<()> {
        let content = serde_json::to_value(TaskRecord {
            kind: KIND.to_string(),
            text: format!("Task: {}", task.description),
            task: task.clone(),
        })?;
        replace_record(self.store.as_ref(), self.scope.record(content), &task.id, key_of).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmCompletionService, LlmError, MockLlmClient};
    use crate::notes::{Note, NoteMetadata};
    use crate::store::InMemoryRecordStore;
    use serde_json::json;

    fn manager_with(llm: Arc<MockLlmClient>) -> (TaskManager, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new("tasks"));
        let completion = Arc::new(LlmCompletionService::new(llm, "test"));
        let scope = SessionScope::new("agent", "user", None);
        (TaskManager::new(store.clone(), scope, completion), store)
    }

    fn manager() -> (TaskManager, Arc<InMemoryRecordStore>) {
        manager_with(Arc::new(MockLlmClient::new()))
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_order() {
        let (tm, _) = manager();
        let a = tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        let b = tm.add_task(NewTask::new("b", "second", "done")).await.unwrap();
        assert_eq!((a.order, b.order), (0, 1));
        assert_eq!(a.status, TaskStatus::Pending);

        let c = tm.add_task(NewTask::new("c", "third", "done").with_order(10)).await.unwrap();
        let d = tm.add_task(NewTask::new("d", "fourth", "done")).await.unwrap();
        assert_eq!((c.order, d.order), (10, 11));
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_order_collision() {
        let (tm, _) = manager();
        tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        let dup = tm.add_task(NewTask::new("a", "again", "done")).await;
        assert!(matches!(dup, Err(AgentError::Validation(_))));
        let clash = tm.add_task(NewTask::new("b", "second", "done").with_order(0)).await;
        assert!(matches!(clash, Err(AgentError::Validation(_))));
        let empty = tm.add_task(NewTask::new(" ", "x", "done")).await;
        assert!(matches!(empty, Err(AgentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_twice_leaves_one_record() {
        let (tm, store) = manager();
        let task = tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        let started = task.with_status(TaskStatus::InProgress);
        tm.update_task(&started).await.unwrap();
        tm.update_task(&started).await.unwrap();

        assert_eq!(store.len().await, 1);
        let all = tm.get_all_tasks().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_update_missing_and_terminal() {
        let (tm, _) = manager();
        let task = tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        let ghost = Task {
            id: "ghost".into(),
            ..task.clone()
        };
        assert!(matches!(tm.update_task(&ghost).await, Err(AgentError::NotFound(_))));

        let done = tm.complete_task(&task).await.unwrap();
        let reopened = tm.update_task(&done.with_status(TaskStatus::Pending)).await;
        assert!(matches!(reopened, Err(AgentError::Validation(_))));
        assert!(tm.update_task(&done).await.is_ok());
    }

    #[tokio::test]
    async fn test_current_task_follows_completion() {
        let (tm, _) = manager();
        let a = tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        tm.add_task(NewTask::new("b", "second", "done")).await.unwrap();
        assert_eq!(tm.current_task().await.unwrap().unwrap().id, "a");

        tm.complete_task(&a).await.unwrap();
        assert_eq!(tm.current_task().await.unwrap().unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_completion_uses_task_notes() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"isComplete": true, "reason": "report exists"}"#,
        ]));
        let (tm, _) = manager_with(llm.clone());
        let task = tm.add_task(NewTask::new("a", "Analyze market", "Report written")).await.unwrap();

        let mut ctx = ExecutionContext::new("agent");
        ctx.notes = vec![
            Note {
                id: "1".into(),
                key: "report".into(),
                value: json!("BTC bullish"),
                metadata: Some(NoteMetadata::for_task("a")),
                timestamp: 0,
            },
            Note {
                id: "2".into(),
                key: "unrelated".into(),
                value: json!("ignore me"),
                metadata: Some(NoteMetadata::for_task("b")),
                timestamp: 0,
            },
        ];
        assert!(tm.evaluate_task_completion(&task, &ctx).await);

        let prompt = llm.request_text(0).unwrap();
        assert!(prompt.contains("Report written"));
        assert!(prompt.contains("BTC bullish"));
        assert!(!prompt.contains("ignore me"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_false() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error(LlmError::ApiError("boom".into()));
        llm.push_reply("not json at all");
        let (tm, _) = manager_with(llm);
        let task = tm.add_task(NewTask::new("a", "first", "done")).await.unwrap();
        let ctx = ExecutionContext::new("agent");
        assert!(!tm.evaluate_task_completion(&task, &ctx).await);
        assert!(!tm.evaluate_task_completion(&task, &ctx).await);
    }
}
