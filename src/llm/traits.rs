//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容端点 / Mock）实现 LlmClient::complete（非流式）。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response from model")]
    EmptyResponse,

    /// 模型输出无法解析为要求的结构
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
