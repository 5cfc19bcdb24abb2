//! Taskloop - 自主智能体编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、会话、执行上下文、迭代编排、启动、主控循环与关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与补全服务
//! - **notes**: 笔记存储与协调
//! - **observability**: 日志初始化
//! - **prompts**: Prompt 模板与格式化
//! - **store**: 仅追加记录存储（内存 / JSONL）
//! - **tasks**: 任务队列
//! - **triggers**: 触发器引擎

pub mod config;
pub mod core;
pub mod llm;
pub mod notes;
pub mod observability;
pub mod prompts;
pub mod store;
pub mod tasks;
pub mod triggers;
