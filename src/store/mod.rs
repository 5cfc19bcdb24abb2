//! 记录存储：仅追加、按会话作用域列举、按 id 删除（无原地更新）
//!
//! 每张表（tasks / triggers / notes / messages / sessions）各用一个 RecordStore 实例。
//! 「更新」统一实现为：先追加新的完整记录，再删除同一逻辑键的旧记录；读取时按逻辑键取 created_at 最大者。

pub mod jsonl;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use jsonl::JsonlRecordStore;
pub use memory::InMemoryRecordStore;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Duplicate record id: {0}")]
    Duplicate(String),

    #[error("Corrupt journal at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// 一条持久化记录：content 为不透明 JSON，由各 Manager 自行解释
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub scope_id: String,
    pub author_id: String,
    pub content: Value,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl Record {
    pub fn new(scope_id: impl Into<String>, author_id: impl Into<String>, content: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scope_id: scope_id.into(),
            author_id: author_id.into(),
            content,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 读取 content 中的字符串字段
    pub fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }
}

/// 记录存储契约（外部协作者）
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 追加一条记录；id 已存在时返回 Duplicate
    async fn create(&self, record: Record) -> Result<(), StoreError>;

    /// 按作用域列出全部记录（按写入顺序）
    async fn list_by_scope(&self, scope_id: &str) -> Result<Vec<Record>, StoreError>;

    /// 按记录 id 删除；不存在时为 no-op
    async fn remove(&self, record_id: &str) -> Result<(), StoreError>;

    /// 表名（用于日志）
    fn table(&self) -> &str;
}

/// 物化：按逻辑键分组，保留 created_at 最大的记录（相同时后写入者胜出），结果保持胜出记录的存储顺序。
/// key_of 返回 None 的记录（不属于本实体）被忽略。
pub fn materialize_latest<F>(records: Vec<Record>, key_of: F) -> Vec<Record>
where
    F: Fn(&Record) -> Option<String>,
{
    let mut winners: HashMap<String, (usize, Record)> = HashMap::new();
    for (idx, record) in records.into_iter().enumerate() {
        let Some(key) = key_of(&record) else {
            continue;
        };
        match winners.get(&key) {
            Some((_, current)) if current.created_at > record.created_at => {}
            _ => {
                winners.insert(key, (idx, record));
            }
        }
    }
    let mut latest: Vec<(usize, Record)> = winners.into_values().collect();
    latest.sort_by_key(|(idx, _)| *idx);
    latest.into_iter().map(|(_, r)| r).collect()
}

/// 替换写：先追加新记录，再删除同一逻辑键的其它记录。
/// 任一时刻读者都至少能看到一条该键的记录，物化视图中至多一条。
pub async fn replace_record<F>(
    store: &dyn RecordStore,
    record: Record,
    key: &str,
    key_of: F,
) -> Result<usize, StoreError>
where
    F: Fn(&Record) -> Option<String>,
{
    let scope_id = record.scope_id.clone();
    let new_id = record.id.clone();
    store.create(record).await?;

    let stale: Vec<String> = store
        .list_by_scope(&scope_id)
        .await?
        .into_iter()
        .filter(|r| r.id != new_id && key_of(r).as_deref() == Some(key))
        .map(|r| r.id)
        .collect();
    for id in &stale {
        store.remove(id).await?;
    }
    if !stale.is_empty() {
        tracing::debug!(table = store.table(), key, removed = stale.len(), "Compacted stale records");
    }
    Ok(stale.len())
}

/// 删除某逻辑键的全部记录，返回删除条数
pub async fn remove_key<F>(
    store: &dyn RecordStore,
    scope_id: &str,
    key: &str,
    key_of: F,
) -> Result<usize, StoreError>
where
    F: Fn(&Record) -> Option<String>,
{
    let ids: Vec<String> = store
        .list_by_scope(scope_id)
        .await?
        .into_iter()
        .filter(|r| key_of(r).as_deref() == Some(key))
        .map(|r| r.id)
        .collect();
    for id in &ids {
        store.remove(id).await?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(key: &str, created_at: i64, value: i64) -> Record {
        let mut r = Record::new("scope", "agent", json!({ "key": key, "value": value }));
        r.created_at = created_at;
        r
    }

    fn key_of(r: &Record) -> Option<String> {
        r.content_str("key").map(String::from)
    }

    #[test]
    fn test_materialize_picks_latest_per_key() {
        let records = vec![rec("a", 10, 1), rec("b", 5, 2), rec("a", 20, 3), rec("a", 15, 4)];
        let latest = materialize_latest(records, key_of);
        assert_eq!(latest.len(), 2);
        let a = latest.iter().find(|r| r.content["key"] == "a").unwrap();
        assert_eq!(a.content["value"], 3);
    }

    #[test]
    fn test_materialize_tie_prefers_later_write() {
        let records = vec![rec("a", 10, 1), rec("a", 10, 2)];
        let latest = materialize_latest(records, key_of);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].content["value"], 2);
    }

    #[test]
    fn test_materialize_skips_foreign_records() {
        let foreign = Record::new("scope", "agent", json!({ "other": true }));
        let latest = materialize_latest(vec![foreign, rec("a", 1, 1)], key_of);
        assert_eq!(latest.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_record_leaves_single_record() {
        let store = InMemoryRecordStore::new("notes");
        store.create(rec("a", 1, 1)).await.unwrap();
        store.create(rec("a", 2, 2)).await.unwrap();

        let removed = replace_record(&store, rec("a", 3, 3), "a", key_of).await.unwrap();
        assert_eq!(removed, 2);

        let all = store.list_by_scope("scope").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content["value"], 3);
    }

    #[tokio::test]
    async fn test_remove_key() {
        let store = InMemoryRecordStore::new("notes");
        store.create(rec("a", 1, 1)).await.unwrap();
        store.create(rec("b", 1, 2)).await.unwrap();
        assert_eq!(remove_key(&store, "scope", "a", key_of).await.unwrap(), 1);
        assert_eq!(remove_key(&store, "scope", "a", key_of).await.unwrap(), 0);
        assert_eq!(store.list_by_scope("scope").await.unwrap().len(), 1);
    }
}
