//! 触发器引擎：polling / dynamic / price 三种门控条件

pub mod evaluator;
pub mod manager;
pub mod types;

pub use evaluator::{
    ConditionVerdict, DynamicEvaluator, EvaluatorRegistry, PollingEvaluator, PriceEvaluator,
    TriggerEvaluator,
};
pub use manager::{AdjustmentReport, TriggerAdjustment, TriggerAdjustments, TriggerManager};
pub use types::{
    Trigger, TriggerEvaluation, TriggerKind, DEFAULT_INTERVAL_MS, MIN_POLLING_INTERVAL_MS,
};
