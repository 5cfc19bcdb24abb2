//! 内存记录存储（测试与无持久化运行时使用）

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Record, RecordStore, StoreError};

/// 内存版：单表记录按写入顺序保存在 Vec 中
pub struct InMemoryRecordStore {
    table: String,
    records: RwLock<Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    /// 全部记录条数（含所有作用域）
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: Record) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.push(record);
        Ok(())
    }

    async fn list_by_scope(&self, scope_id: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.scope_id == scope_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, record_id: &str) -> Result<(), StoreError> {
        self.records.write().await.retain(|r| r.id != record_id);
        Ok(())
    }

    fn table(&self) -> &str {
        &self.table
    }
}
