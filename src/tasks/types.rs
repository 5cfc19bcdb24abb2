//! 任务数据模型

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::triggers::TriggerKind;

/// 任务状态：pending → in_progress → completed（终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

/// 已持久化的任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub definition_of_done: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub trigger_types: BTreeSet<TriggerKind>,
    /// 执行顺序，越小越先
    pub order: i64,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// 复制并设置新状态
    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// 新建任务的输入；order 为空时由 TaskManager 追加到队尾
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: String,
    pub description: String,
    pub definition_of_done: String,
    pub order: Option<i64>,
    pub trigger_types: BTreeSet<TriggerKind>,
    pub data: Map<String, Value>,
}

impl NewTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        definition_of_done: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            definition_of_done: definition_of_done.into(),
            order: None,
            trigger_types: BTreeSet::new(),
            data: Map::new(),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_trigger_types(mut self, kinds: impl IntoIterator<Item = TriggerKind>) -> Self {
        self.trigger_types = kinds.into_iter().collect();
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// 派生「当前任务」：order 最小且未完成者；全部完成时为 None
pub fn current_of(tasks: &[Task]) -> Option<&Task> {
    tasks
        .iter()
        .filter(|t| !t.is_completed())
        .min_by_key(|t| (t.order, t.created_at))
}
