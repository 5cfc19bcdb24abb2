//! 动作处理契约：回复分派给 ActionHandler，派生记录通过 ActionCallback 写入对话表

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::core::context::ExecutionContext;
use crate::core::error::AgentResult;
use crate::core::session::SessionScope;
use crate::llm::Content;
use crate::store::{Record, RecordStore};

/// 对话表中的记录种类
pub const TRIGGER_ACTIVATION: &str = "trigger_activation";
pub const RESPONSE: &str = "response";
pub const ACTION_RESULT: &str = "action_result";

/// 写入动作产生的内容，返回已持久化的记录
#[async_trait]
pub trait ActionCallback: Send + Sync {
    async fn persist(&self, content: Content) -> AgentResult<Vec<Record>>;
}

/// 处理智能体回复（执行 action）
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn process(&self, response: &Record, callback: &dyn ActionCallback) -> AgentResult<()>;
}

/// 回复之后的附加评估
#[async_trait]
pub trait ResponseEvaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, response: &Record, context: &ExecutionContext) -> AgentResult<()>;
}

/// 对话表写入器
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn RecordStore>,
    scope: SessionScope,
}

impl MessageLog {
    pub fn new(store: Arc<dyn RecordStore>, scope: SessionScope) -> Self {
        Self { store, scope }
    }

    pub async fn append(&self, kind: &str, text: &str, extra: Value) -> AgentResult<Record> {
        let mut content = json!({ "kind": kind, "text": text });
        if let (Some(obj), Value::Object(extra)) = (content.as_object_mut(), extra) {
            obj.extend(extra);
        }
        let record = self.scope.record(content);
        self.store.create(record.clone()).await?;
        Ok(record)
    }

    pub async fn append_content(&self, kind: &str, content: &Content) -> AgentResult<Record> {
        let extra = match &content.action {
            Some(action) => json!({ "action": action }),
            None => Value::Null,
        };
        self.append(kind, &content.text, extra).await
    }
}

#[async_trait]
impl ActionCallback for MessageLog {
    async fn persist(&self, content: Content) -> AgentResult<Vec<Record>> {
        Ok(vec![self.append_content(ACTION_RESULT, &content).await?])
    }
}

/// 判断回复是否带有需要执行的 action
pub fn requested_action(response: &Record) -> Option<&str> {
    response
        .content_str("action")
        .map(str::trim)
        .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("none"))
}

/// 不执行任何动作，只记录一条确认
pub struct AcknowledgeActionHandler;

#[async_trait]
impl ActionHandler for AcknowledgeActionHandler {
    async fn process(&self, response: &Record, callback: &dyn ActionCallback) -> AgentResult<()> {
        let Some(action) = requested_action(response) else {
            return Ok(());
        };
        info!(action, "Action requested");
        callback
            .persist(Content {
                text: format!("Action {action} acknowledged"),
                action: Some(action.to_string()),
            })
            .await?;
        Ok(())
    }
}
