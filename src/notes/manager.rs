//! 笔记存储：按 key 逻辑唯一的持久事实，以及 LLM 驱动的协调

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::context::ExecutionContext;
use crate::core::error::{AgentError, AgentResult};
use crate::core::session::SessionScope;
use crate::llm::{generate_batch, CompletionService};
use crate::notes::types::{Note, NoteMetadata};
use crate::prompts;
use crate::store::{materialize_latest, remove_key, replace_record, Record, RecordStore};

const KIND: &str = "note";

#[derive(Debug, Serialize, Deserialize)]
struct NoteRecord {
    kind: String,
    text: String,
    #[serde(flatten)]
    note: Note,
}

fn key_of(record: &Record) -> Option<String> {
    (record.content_str("kind") == Some(KIND))
        .then(|| record.content_str("key").map(String::from))
        .flatten()
}

/// 补全服务给出的单条笔记操作
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NoteOperation {
    /// add / update / remove
    pub action: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub metadata: Option<NoteMetadata>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 请求形状；各项单独解析，一条格式错误不影响其他项
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NoteOperations {
    #[serde(default)]
    pub notes: Vec<NoteOperation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteReconciliation {
    pub applied: usize,
    pub failed: usize,
}

pub struct NoteManager {
    store: Arc<dyn RecordStore>,
    scope: SessionScope,
    completion: Arc<dyn CompletionService>,
}

impl NoteManager {
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

    /// 全部笔记，按 timestamp 升序
    pub async fn get_all_notes(&self) -> AgentResult<Vec<Note>> {
        let records = self.store.list_by_scope(&self.scope.room_id).await?;
        let mut notes = materialize_latest(records, key_of)
            .into_iter()
            .map(|r| serde_json::from_value::<NoteRecord>(r.content).map(|nr| nr.note))
            .collect::<Result<Vec<_>, _>>()?;
        notes.sort_by_key(|n| n.timestamp);
        Ok(notes)
    }

    pub async fn get_note(&self, key: &str) -> AgentResult<Option<Note>> {
        Ok(self.get_all_notes().await?.into_iter().find(|n| n.key == key))
    }

    pub async fn get_notes_by_task(&self, task_id: &str) -> AgentResult<Vec<Note>> {
        Ok(self
            .get_all_notes()
            .await?
            .into_iter()
            .filter(|n| n.task_id() == Some(task_id))
            .collect())
    }

    /// 写入笔记；key 已存在时整体替换
    pub async fn add_note(
        &self,
        key: &str,
        value: Value,
        metadata: Option<NoteMetadata>,
    ) -> AgentResult<Note> {
        if key.trim().is_empty() {
            return Err(AgentError::Validation("note key must not be empty".into()));
        }
        let id = match self.get_note(key).await? {
            Some(existing) => existing.id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        let note = Note {
            id,
            key: key.to_string(),
            value,
            metadata,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.write(&note).await?;
        info!(key, "Note added");
        Ok(note)
    }

    /// 更新已有笔记；metadata 为 None 时保留原值
    pub async fn update_note(
        &self,
        key: &str,
        value: Value,
        metadata: Option<NoteMetadata>,
    ) -> AgentResult<Note> {
        let existing = self
            .get_note(key)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("note {key}")))?;
        let note = Note {
            id: existing.id,
            key: existing.key,
            value,
            metadata: metadata.or(existing.metadata),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.write(&note).await?;
        debug!(key, "Note updated");
        Ok(note)
    }

    pub async fn remove_note(&self, key: &str) -> AgentResult<()> {
        let removed = remove_key(self.store.as_ref(), &self.scope.room_id, key, key_of).await?;
        if removed == 0 {
            return Err(AgentError::NotFound(format!("note {key}")));
        }
        info!(key, "Note removed");
        Ok(())
    }

    /// 请补全服务给出笔记增删改并逐条应用
    pub async fn evaluate_notes(&self, context: &ExecutionContext) -> AgentResult<NoteReconciliation> {
        let prompt = prompts::note_evaluation_prompt(context);
        let batch = generate_batch::<NoteOperations>(self.completion.as_ref(), &prompt, "notes");
        let items = match batch.await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Note evaluation request failed");
                return Ok(NoteReconciliation::default());
            }
        };

        let mut report = NoteReconciliation::default();
        for item in items {
            let op = match serde_json::from_value::<NoteOperation>(item) {
                Ok(op) => op,
                Err(e) => {
                    warn!(error = %e, "Malformed note operation");
                    report.failed += 1;
                    continue;
                }
            };
            let result = match op.action.trim().to_lowercase().as_str() {
                "add" => self.add_note(&op.key, op.value, op.metadata).await.map(|_| ()),
                "update" => self.update_note(&op.key, op.value, op.metadata).await.map(|_| ()),
                "remove" => self.remove_note(&op.key).await,
                other => Err(AgentError::Validation(format!("unknown note action: {other}"))),
            };
            match result {
                Ok(()) => {
                    debug!(key = %op.key, reason = op.reason.as_deref().unwrap_or(""), "Note operation applied");
                    report.applied += 1;
                }
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => {
                    warn!(key = %op.key, error = %e, "Note operation failed");
                    report.failed += 1;
                }
            }
        }
        info!(applied = report.applied, failed = report.failed, "Notes reconciled");
        Ok(report)
    }

    async fn write(&self, note: &Note) -> AgentResult<()> {
        let content = serde_json::to_value(NoteRecord {
            kind: KIND.to_string(),
            text: format!("Note {}: {}", note.key, note.value),
            note: note.clone(),
        })?;
        replace_record(self.store.as_ref(), self.scope.record(content), &note.key, key_of).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmCompletionService, MockLlmClient};
    use crate::store::InMemoryRecordStore;
    use serde_json::json;

    fn manager_with(llm: Arc<MockLlmClient>) -> (NoteManager, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new("notes"));
        let completion = Arc::new(LlmCompletionService::new(llm, "test"));
        let nm = NoteManager::new(store.clone(), SessionScope::new("agent", "user", None), completion);
        (nm, store)
    }

    fn manager() -> NoteManager {
        manager_with(Arc::new(MockLlmClient::new())).0
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let nm = manager();
        let res = nm.update_note("missing", json!(1), None).await;
        assert!(matches!(res, Err(AgentError::NotFound(_))));
        assert!(matches!(nm.remove_note("missing").await, Err(AgentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_reflects_latest_and_keeps_metadata() {
        let (nm, store) = manager_with(Arc::new(MockLlmClient::new()));
        let added = nm
            .add_note("strike", json!(65000), Some(NoteMetadata::for_task("analyze")))
            .await
            .unwrap();
        nm.update_note("strike", json!(66000), None).await.unwrap();

        let note = nm.get_note("strike").await.unwrap().unwrap();
        assert_eq!(note.value, json!(66000));
        assert_eq!(note.id, added.id);
        assert_eq!(note.task_id(), Some("analyze"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_existing_key_is_upsert() {
        let nm = manager();
        nm.add_note("k", json!("a"), None).await.unwrap();
        nm.add_note("k", json!("b"), None).await.unwrap();
        let all = nm.get_all_notes().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, json!("b"));
        assert!(matches!(nm.add_note("", json!(1), None).await, Err(AgentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_notes_by_task() {
        let nm = manager();
        nm.add_note("a", json!(1), Some(NoteMetadata::for_task("t1"))).await.unwrap();
        nm.add_note("b", json!(2), Some(NoteMetadata::for_task("t2"))).await.unwrap();
        nm.add_note("c", json!(3), None).await.unwrap();
        let notes = nm.get_notes_by_task("t1").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].key, "a");
    }

    #[tokio::test]
    async fn test_evaluate_notes_isolates_failures() {
        let llm = Arc::new(MockLlmClient::with_replies([r#"```json
{"notes": [
  {"action": "add", "key": "strike", "value": 70000, "metadata": {"taskId": "open-position"}, "reason": "picked"},
  {"action": "update", "key": "ghost", "value": 1, "reason": "no such note"},
  {"action": "remove", "key": "stale", "reason": "outdated"},
  {"action": "archive", "key": "stale", "reason": "bogus"}
]}
```"#]));
        let (nm, _) = manager_with(llm);
        nm.add_note("stale", json!("old"), None).await.unwrap();

        let report = nm.evaluate_notes(&ExecutionContext::new("agent")).await.unwrap();
        assert_eq!(report, NoteReconciliation { applied: 2, failed: 2 });

        let all = nm.get_all_notes().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, "strike");
        assert_eq!(all[0].task_id(), Some("open-position"));
    }

    #[tokio::test]
    async fn test_malformed_operation_does_not_drop_siblings() {
        let llm = Arc::new(MockLlmClient::with_replies([r#"{"notes": [
  {"action": "add", "key": "good", "value": 1},
  {"action": "add", "key": "bad", "value": 2, "metadata": {"priority": "high"}},
  {"action": "add", "value": 3}
]}"#]));
        let (nm, _) = manager_with(llm);

        let report = nm.evaluate_notes(&ExecutionContext::new("agent")).await.unwrap();
        assert_eq!(report, NoteReconciliation { applied: 1, failed: 2 });

        let all = nm.get_all_notes().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, "good");
    }
}
