//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及结构化 / 自由文本补全服务

pub mod completion;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use completion::{
    extract_json, generate_batch, generate_object, CompletionService, Content, LlmCompletionService,
    ResultShape,
};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
