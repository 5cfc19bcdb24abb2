//! 补全服务：结构化结果（判定 / 协调）与自由文本（智能体下一步动作）
//!
//! 结构化调用把 schemars 生成的 JSON Schema 注入 system prompt，再从模型输出中提取 JSON；
//! 自由文本调用返回 Content { text, action }，模型若输出 JSON 对象则按字段解析，否则整段作为 text。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, Message};

/// 智能体产出的内容（回复文本 + 可选动作名）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Content {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }
}

/// 结构化结果的形状：类型名 + JSON Schema
#[derive(Debug, Clone)]
pub struct ResultShape {
    pub name: String,
    pub schema: Value,
}

impl ResultShape {
    pub fn of<T: JsonSchema>() -> Self {
        let schema = schema_for!(T);
        Self {
            name: T::schema_name(),
            schema: serde_json::to_value(schema).unwrap_or(Value::Null),
        }
    }
}

/// 补全服务契约（外部协作者）
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// 返回符合 shape 的 JSON；失败或格式不符返回 Err
    async fn generate_structured(&self, context: &str, shape: &ResultShape)
        -> Result<Value, LlmError>;

    /// 自由文本回复；模型无输出时返回 None
    async fn generate_freeform(&self, context: &str) -> Result<Option<Content>, LlmError>;
}

/// 结构化调用并反序列化为 T
pub async fn generate_object<T>(service: &dyn CompletionService, context: &str) -> Result<T, LlmError>
where
    T: JsonSchema + DeserializeOwned,
{
    let shape = ResultShape::of::<T>();
    let value = service.generate_structured(context, &shape).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Malformed(format!("{}: {}", shape.name, e)))
}

/// 批量结构化调用：按 T 的 schema 请求，只取出 `field` 数组，逐项解析交给调用方
///
/// 字段缺失或为 null 时视为空列表；外层不是对象或字段不是数组时返回 Malformed。
pub async fn generate_batch<T>(
    service: &dyn CompletionService,
    context: &str,
    field: &str,
) -> Result<Vec<Value>, LlmError>
where
    T: JsonSchema,
{
    let shape = ResultShape::of::<T>();
    let Value::Object(mut object) = service.generate_structured(context, &shape).await? else {
        return Err(LlmError::Malformed(format!("{}: expected a JSON object", shape.name)));
    };
    match object.remove(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(LlmError::Malformed(format!(
            "{}: `{}` is not a list: {}",
            shape.name, field, other
        ))),
    }
}

/// 从模型输出中提取 JSON 文本（```json 代码块或首个 `{` 到末个 `}`）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end >= start).then(|| &trimmed[start..=end])
}

/// 基于 LlmClient 的补全服务实现
pub struct LlmCompletionService {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmCompletionService {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl CompletionService for LlmCompletionService {
    async fn generate_structured(
        &self,
        context: &str,
        shape: &ResultShape,
    ) -> Result<Value, LlmError> {
        let schema = serde_json::to_string_pretty(&shape.schema)
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        let system = format!(
            "{}\n\nRespond with a single JSON object named {} that matches this JSON Schema. \
             Output only the JSON, no prose.\n```json\n{}\n```",
            self.system_prompt, shape.name, schema
        );
        let messages = vec![Message::system(system), Message::user(context.to_string())];
        let output = self.llm.complete(&messages).await?;

        let json = extract_json(&output)
            .ok_or_else(|| LlmError::Malformed(format!("no JSON object in output for {}", shape.name)))?;
        serde_json::from_str(json).map_err(|e| LlmError::Malformed(format!("{}: {}", e, json)))
    }

    async fn generate_freeform(&self, context: &str) -> Result<Option<Content>, LlmError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(context.to_string()),
        ];
        let output = self.llm.complete(&messages).await?;
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let parsed = extract_json(trimmed)
            .and_then(|json| serde_json::from_str::<Content>(json).ok())
            .filter(|c| !c.text.trim().is_empty());
        Ok(Some(parsed.unwrap_or_else(|| Content::text(trimmed))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Verdict {
        is_complete: bool,
        #[allow(dead_code)]
        reason: String,
    }

    #[test]
    fn test_extract_json_fenced_and_bare() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("sure: {\"a\":1} done"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_generate_object_parses_schema_conformant_reply() {
        let mock = Arc::new(MockLlmClient::with_replies([
            "```json\n{\"isComplete\": true, \"reason\": \"done\"}\n```",
        ]));
        let service = LlmCompletionService::new(mock.clone(), "system");
        let verdict: Verdict = generate_object(&service, "ctx").await.unwrap();
        assert!(verdict.is_complete);
        assert!(mock.request_text(0).unwrap().contains("isComplete"));
    }

    #[tokio::test]
    async fn test_generate_object_rejects_wrong_shape() {
        let mock = Arc::new(MockLlmClient::with_replies(["{\"unexpected\": 1}"]));
        let service = LlmCompletionService::new(mock, "system");
        let result: Result<Verdict, _> = generate_object(&service, "ctx").await;
        assert!(matches!(result, Err(LlmError::Malformed(_))));
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Batch {
        items: Vec<Verdict>,
    }

    #[tokio::test]
    async fn test_generate_batch_keeps_items_raw() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"items": [{"isComplete": true, "reason": "ok"}, {"isComplete": "maybe"}]}"#,
            r#"{"other": 1}"#,
            r#"{"items": "none"}"#,
        ]));
        let service = LlmCompletionService::new(mock, "system");

        let items = generate_batch::<Batch>(&service, "ctx", "items").await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(serde_json::from_value::<Verdict>(items[0].clone()).is_ok());
        assert!(serde_json::from_value::<Verdict>(items[1].clone()).is_err());

        assert!(generate_batch::<Batch>(&service, "ctx", "items").await.unwrap().is_empty());
        let wrong = generate_batch::<Batch>(&service, "ctx", "items").await;
        assert!(matches!(wrong, Err(LlmError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_freeform_json_and_plain_text() {
        let mock = Arc::new(MockLlmClient::with_replies([
            "{\"text\": \"checking the queue\", \"action\": \"NONE\"}",
            "plain answer",
            "   ",
        ]));
        let service = LlmCompletionService::new(mock, "system");

        let first = service.generate_freeform("ctx").await.unwrap().unwrap();
        assert_eq!(first.action.as_deref(), Some("NONE"));
        assert_eq!(first.text, "checking the queue");

        let second = service.generate_freeform("ctx").await.unwrap().unwrap();
        assert_eq!(second, Content::text("plain answer"));

        assert!(service.generate_freeform("ctx").await.unwrap().is_none());
    }
}
