//! 编排核心错误类型
//!
//! 四类错误：输入校验（Validation）、键不存在（NotFound）、补全服务失败（Service）、存储失败（Persistence）。
//! Service 在调用点被吞掉并记日志；Persistence 通过 `?` 上抛，中止当前迭代。

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// 编排核心运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 任务 / 触发器 / 笔记输入不合法（如 dynamic 触发器缺少 condition）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 更新或删除引用了不存在的键
    #[error("Not found: {0}")]
    NotFound(String),

    /// 补全服务调用失败或返回格式不符
    #[error("Completion service failure: {0}")]
    Service(String),

    /// 记录存储写入 / 读取失败
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 是否为需要中止本轮迭代的错误
    pub fn is_persistence(&self) -> bool {
        matches!(self, AgentError::Persistence(_))
    }
}

impl From<StoreError> for AgentError {
    fn from(err: StoreError) -> Self {
        AgentError::Persistence(err.to_string())
    }
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        AgentError::Service(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Persistence(format!("record (de)serialization: {err}"))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_persistence() {
        let err: AgentError = StoreError::Io("disk full".to_string()).into();
        assert!(err.is_persistence());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_llm_error_maps_to_service() {
        let err: AgentError = LlmError::EmptyResponse.into();
        assert!(matches!(err, AgentError::Service(_)));
        assert!(!err.is_persistence());
    }
}
