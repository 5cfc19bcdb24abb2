//! 触发器评估器：按 TriggerKind 分派
//!
//! 评估器可以修改触发器的 last_check / last_evaluation，由 TriggerManager 负责持久化。
//! 新增种类只需实现 TriggerEvaluator 并注册，不影响已有种类。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::core::context::ExecutionContext;
use crate::llm::{generate_object, CompletionService};
use crate::prompts;
use crate::triggers::types::{Trigger, TriggerEvaluation, TriggerKind};

#[async_trait]
pub trait TriggerEvaluator: Send + Sync {
    /// 评估一次；now 为毫秒时间戳
    async fn evaluate(
        &self,
        trigger: &mut Trigger,
        context: Option<&ExecutionContext>,
        now: i64,
    ) -> TriggerEvaluation;
}

/// 固定间隔
pub struct PollingEvaluator;

#[async_trait]
impl TriggerEvaluator for PollingEvaluator {
    async fn evaluate(
        &self,
        trigger: &mut Trigger,
        _context: Option<&ExecutionContext>,
        now: i64,
    ) -> TriggerEvaluation {
        if !trigger.interval_elapsed(now) {
            return TriggerEvaluation::not_triggered("Polling interval not yet elapsed", now);
        }
        let evaluation = TriggerEvaluation::triggered(
            format!("Polling interval of {}ms elapsed", trigger.interval_ms()),
            now,
        );
        trigger.last_check = Some(now);
        trigger.last_evaluation = Some(evaluation.clone());
        evaluation
    }
}

/// 条件评估结果（补全服务返回）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionVerdict {
    pub is_triggered: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub response: Option<Value>,
}

/// 防抖的自然语言条件，由补全服务判定
pub struct DynamicEvaluator {
    completion: Arc<dyn CompletionService>,
}

impl DynamicEvaluator {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl TriggerEvaluator for DynamicEvaluator {
    async fn evaluate(
        &self,
        trigger: &mut Trigger,
        context: Option<&ExecutionContext>,
        now: i64,
    ) -> TriggerEvaluation {
        if !trigger.interval_elapsed(now) {
            return TriggerEvaluation::not_triggered("Debounce interval not yet elapsed", now);
        }
        trigger.last_check = Some(now);

        let evaluation = match (trigger.condition(), context) {
            (None, _) => TriggerEvaluation::not_triggered("Dynamic trigger has no condition", now),
            (Some(_), None) => {
                TriggerEvaluation::not_triggered("No execution context to evaluate condition", now)
            }
            (Some(condition), Some(ctx)) => {
                let prompt = prompts::trigger_evaluation_prompt(condition, ctx);
                match generate_object::<ConditionVerdict>(self.completion.as_ref(), &prompt).await {
                    Ok(verdict) => TriggerEvaluation {
                        is_triggered: verdict.is_triggered,
                        reason: verdict.reason,
                        timestamp: now,
                        response: verdict.response,
                    },
                    Err(e) => {
                        error!(trigger_id = %trigger.id, error = %e, "Condition evaluation failed");
                        TriggerEvaluation::not_triggered(format!("Condition evaluation failed: {e}"), now)
                    }
                }
            }
        };
        debug!(trigger_id = %trigger.id, triggered = evaluation.is_triggered, "Dynamic trigger evaluated");
        trigger.last_evaluation = Some(evaluation.clone());
        evaluation
    }
}

/// 价格阈值：未接入行情，始终不触发
pub struct PriceEvaluator;

#[async_trait]
impl TriggerEvaluator for PriceEvaluator {
    async fn evaluate(
        &self,
        _trigger: &mut Trigger,
        _context: Option<&ExecutionContext>,
        now: i64,
    ) -> TriggerEvaluation {
        TriggerEvaluation::not_triggered("price trigger evaluation not implemented", now)
    }
}

/// TriggerKind → 评估器
#[derive(Default, Clone)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<TriggerKind, Arc<dyn TriggerEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// polling / dynamic / price
    pub fn with_defaults(completion: Arc<dyn CompletionService>) -> Self {
        let mut registry = Self::new();
        registry.register(TriggerKind::Polling, PollingEvaluator);
        registry.register(TriggerKind::Dynamic, DynamicEvaluator::new(completion));
        registry.register(TriggerKind::Price, PriceEvaluator);
        registry
    }

    pub fn register<E: TriggerEvaluator + 'static>(&mut self, kind: TriggerKind, evaluator: E) {
        self.evaluators.insert(kind, Arc::new(evaluator));
    }

    pub fn get(&self, kind: &TriggerKind) -> Option<Arc<dyn TriggerEvaluator>> {
        self.evaluators.get(kind).cloned()
    }

    pub fn supports(&self, kind: &TriggerKind) -> bool {
        self.evaluators.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmCompletionService, LlmError, MockLlmClient};

    fn dynamic_evaluator(llm: Arc<MockLlmClient>) -> DynamicEvaluator {
        DynamicEvaluator::new(Arc::new(LlmCompletionService::new(llm, "test")))
    }

    #[tokio::test]
    async fn test_polling_interval_boundary() {
        let mut t = Trigger::polling("p", 5000);
        t.last_check = Some(10_000);

        let early = PollingEvaluator.evaluate(&mut t, None, 10_000 + 5000 - 1).await;
        assert!(!early.is_triggered);
        assert_eq!(t.last_check, Some(10_000));

        let due = PollingEvaluator.evaluate(&mut t, None, 15_000).await;
        assert!(due.is_triggered);
        assert_eq!(t.last_check, Some(15_000));
        assert_eq!(t.last_evaluation.as_ref().map(|e| e.timestamp), Some(15_000));
    }

    #[tokio::test]
    async fn test_polling_first_check_triggers() {
        let mut t = Trigger::polling("p", 5000);
        assert!(PollingEvaluator.evaluate(&mut t, None, 1).await.is_triggered);
    }

    #[tokio::test]
    async fn test_dynamic_calls_service_after_debounce() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"isTriggered": true, "reason": "BTC broke 70k", "response": {"price": 70100}}"#,
        ]));
        let evaluator = dynamic_evaluator(llm.clone());
        let mut t = Trigger::dynamic("d", "BTC above 70k", 3000);
        let ctx = ExecutionContext::new("agent");

        let eval = evaluator.evaluate(&mut t, Some(&ctx), 1000).await;
        assert!(eval.is_triggered);
        assert_eq!(eval.response, Some(serde_json::json!({"price": 70100})));
        assert!(llm.request_text(0).unwrap().contains("BTC above 70k"));

        let debounced = evaluator.evaluate(&mut t, Some(&ctx), 2000).await;
        assert!(!debounced.is_triggered);
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_without_context_or_condition() {
        let llm = Arc::new(MockLlmClient::new());
        let evaluator = dynamic_evaluator(llm.clone());

        let mut t = Trigger::dynamic("d", "BTC above 70k", 3000);
        let eval = evaluator.evaluate(&mut t, None, 1000).await;
        assert!(!eval.is_triggered);
        assert_eq!(t.last_check, Some(1000));

        let mut blank = Trigger::dynamic("d2", "", 3000);
        let ctx = ExecutionContext::new("agent");
        assert!(!evaluator.evaluate(&mut blank, Some(&ctx), 1000).await.is_triggered);
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_dynamic_service_failure_not_triggered() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error(LlmError::Timeout(30));
        let evaluator = dynamic_evaluator(llm);
        let mut t = Trigger::dynamic("d", "cond", 3000);
        let ctx = ExecutionContext::new("agent");
        let eval = evaluator.evaluate(&mut t, Some(&ctx), 1000).await;
        assert!(!eval.is_triggered);
        assert!(eval.reason.contains("failed"));
    }

    #[tokio::test]
    async fn test_price_is_stub() {
        let mut t = Trigger::new("x", TriggerKind::Price, Default::default());
        let eval = PriceEvaluator.evaluate(&mut t, None, 1).await;
        assert!(!eval.is_triggered);
        assert_eq!(eval.reason, "price trigger evaluation not implemented");
    }
}
