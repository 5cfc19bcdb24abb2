//! 核心编排层：错误、会话、上下文、动作契约、迭代、启动、节奏、主控循环与关闭

pub mod actions;
pub mod bootstrap;
pub mod builder;
pub mod context;
pub mod error;
pub mod iteration;
pub mod pacing;
pub mod runner;
pub mod session;
pub mod shutdown;

pub use actions::{
    AcknowledgeActionHandler, ActionCallback, ActionHandler, MessageLog, ResponseEvaluator,
};
pub use bootstrap::{bootstrap, ensure_session, BootstrapReport, POLLING_TRIGGER_ID};
pub use builder::{
    create_llm_from_config, resolve_backend, Agent, AgentBuilder, LlmBackend, Stores,
};
pub use context::{ContextComposer, ExecutionContext};
pub use error::{AgentError, AgentResult};
pub use iteration::{AgentRuntime, CycleOutcome, Orchestrator};
pub use pacing::{pacer_from_config, ManualPacer, PaceDecision, Pacer, SleepPacer};
pub use runner::{run_loop, RunSummary};
pub use session::{stable_id, SessionScope};
pub use shutdown::{ShutdownManager, ShutdownReason};
