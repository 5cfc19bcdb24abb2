//! JSON Lines 文件记录存储
//!
//! 每张表一个 `<table>.jsonl` 文件，只追加：创建写入 `{"op":"create","record":...}`，
//! 删除写入墓碑 `{"op":"remove","id":...}`。打开时重放日志重建内存视图，进程重启后任务 / 触发器 / 笔记状态不丢失。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Record, RecordStore, StoreError};

/// 日志行
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Create { record: Record },
    Remove { id: String },
}

/// 文件版记录存储；写入串行化在 Mutex 内，保证日志行顺序与内存视图一致
pub struct JsonlRecordStore {
    table: String,
    path: PathBuf,
    records: Mutex<Vec<Record>>,
}

impl JsonlRecordStore {
    /// 打开（或创建）目录下的表文件并重放；中断写入留下的残行会被截掉，后续追加从完整行之后开始
    pub async fn open(dir: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{table}.jsonl"));

        let records = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read_to_string(&path).await?;
            let (records, valid_len) = replay(&data)?;
            repair_tail(&path, &data, valid_len).await?;
            records
        } else {
            Vec::new()
        };
        tracing::debug!(table, records = records.len(), path = %path.display(), "Journal replayed");

        Ok(Self {
            table: table.to_string(),
            path,
            records: Mutex::new(records),
        })
    }

    async fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// 重放日志，返回记录与完整行的字节长度；末行损坏视为写入中断并跳过，中间行损坏则报错
fn replay(data: &str) -> Result<(Vec<Record>, usize), StoreError> {
    let mut records: Vec<Record> = Vec::new();
    let mut offset = 0;
    let mut valid_len = 0;
    let mut lines = data.split_inclusive('\n').enumerate().peekable();
    while let Some((idx, raw)) = lines.next() {
        offset += raw.len();
        let line = raw.trim();
        if !line.is_empty() {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(JournalEntry::Create { record }) => records.push(record),
                Ok(JournalEntry::Remove { id }) => records.retain(|r| r.id != id),
                Err(e) if lines.peek().is_none() => {
                    tracing::warn!(line = idx + 1, "Skipping truncated journal tail: {}", e);
                    break;
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        line: idx + 1,
                        message: e.to_string(),
                    })
                }
            }
        }
        valid_len = offset;
    }
    Ok((records, valid_len))
}

/// 截掉残行，并保证文件以换行结尾
async fn repair_tail(path: &Path, data: &str, valid_len: usize) -> Result<(), StoreError> {
    if valid_len < data.len() {
        tracing::warn!(
            path = %path.display(),
            bytes = data.len() - valid_len,
            "Truncating torn journal tail"
        );
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(valid_len as u64).await?;
        file.sync_all().await?;
    }
    if valid_len > 0 && !data[..valid_len].ends_with('\n') {
        let mut file = tokio::fs::OpenOptions::new().append(true).open(path).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
    }
    Ok(())
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn create(&self, record: Record) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        self.append(&JournalEntry::Create {
            record: record.clone(),
        })
        .await?;
        records.push(record);
        Ok(())
    }

    async fn list_by_scope(&self, scope_id: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.scope_id == scope_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, record_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if !records.iter().any(|r| r.id == record_id) {
            return Ok(());
        }
        self.append(&JournalEntry::Remove {
            id: record_id.to_string(),
        })
        .await?;
        records.retain(|r| r.id != record_id);
        Ok(())
    }

    fn table(&self) -> &str {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reopen_replays_creates_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let kept = Record::new("room", "agent", json!({ "key": "kept" }));
        let dropped = Record::new("room", "agent", json!({ "key": "dropped" }));
        {
            let store = JsonlRecordStore::open(dir.path(), "notes").await.unwrap();
            store.create(kept.clone()).await.unwrap();
            store.create(dropped.clone()).await.unwrap();
            store.remove(&dropped.id).await.unwrap();
        }

        let store = JsonlRecordStore::open(dir.path(), "notes").await.unwrap();
        let records = store.list_by_scope("room").await.unwrap();
        assert_eq!(records, vec![kept]);
    }

    #[tokio::test]
    async fn test_truncated_tail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new("room", "agent", json!({}));
        {
            let store = JsonlRecordStore::open(dir.path(), "tasks").await.unwrap();
            store.create(record.clone()).await.unwrap();
        }
        let path = dir.path().join("tasks.jsonl");
        let mut data = std::fs::read_to_string(&path).unwrap();
        data.push_str("{\"op\":\"create\",\"rec");
        std::fs::write(&path, data).unwrap();

        let store = JsonlRecordStore::open(dir.path(), "tasks").await.unwrap();
        assert_eq!(store.list_by_scope("room").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_after_torn_tail_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = Record::new("room", "agent", json!({ "key": "first" }));
        let second = Record::new("room", "agent", json!({ "key": "second" }));
        {
            let store = JsonlRecordStore::open(dir.path(), "tasks").await.unwrap();
            store.create(first.clone()).await.unwrap();
        }
        let path = dir.path().join("tasks.jsonl");
        let mut data = std::fs::read_to_string(&path).unwrap();
        data.push_str("{\"op\":\"create\",\"rec");
        std::fs::write(&path, data).unwrap();

        {
            let store = JsonlRecordStore::open(dir.path(), "tasks").await.unwrap();
            store.create(second.clone()).await.unwrap();
        }
        let store = JsonlRecordStore::open(dir.path(), "tasks").await.unwrap();
        assert_eq!(store.list_by_scope("room").await.unwrap(), vec![first, second]);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[tokio::test]
    async fn test_missing_final_newline_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let first = Record::new("room", "agent", json!({}));
        let second = Record::new("room", "agent", json!({}));
        let entry = JournalEntry::Create {
            record: first.clone(),
        };
        let line = serde_json::to_string(&entry).unwrap();
        std::fs::write(dir.path().join("notes.jsonl"), line).unwrap();

        {
            let store = JsonlRecordStore::open(dir.path(), "notes").await.unwrap();
            store.create(second.clone()).await.unwrap();
        }
        let store = JsonlRecordStore::open(dir.path(), "notes").await.unwrap();
        assert_eq!(store.list_by_scope("room").await.unwrap(), vec![first, second]);
    }

    #[test]
    fn test_corrupt_middle_line_is_error() {
        let data = "not json\n{\"op\":\"remove\",\"id\":\"x\"}\n";
        assert!(matches!(replay(data), Err(StoreError::Corrupt { line: 1, .. })));
    }
}
