//! 触发器管理：校验、持久化、评估与 LLM 驱动的调整

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::core::context::ExecutionContext;
use crate::core::error::{AgentError, AgentResult};
use crate::core::session::SessionScope;
use crate::llm::{generate_batch, CompletionService};
use crate::prompts;
use crate::store::{materialize_latest, remove_key, replace_record, Record, RecordStore};
use crate::triggers::evaluator::EvaluatorRegistry;
use crate::triggers::types::{
    Trigger, TriggerEvaluation, TriggerKind, DEFAULT_INTERVAL_MS, MIN_POLLING_INTERVAL_MS,
};

const KIND: &str = "trigger";

#[derive(Debug, Serialize, Deserialize)]
struct TriggerRecord {
    kind: String,
    text: String,
    #[serde(flatten)]
    trigger: Trigger,
}

fn key_of(record: &Record) -> Option<String> {
    (record.content_str("kind") == Some(KIND))
        .then(|| record.content_str("id").map(String::from))
        .flatten()
}

/// 补全服务给出的单条调整
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TriggerAdjustment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// add / remove / modify
    pub action: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// 请求形状；各项单独解析，一条格式错误不影响其他项
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TriggerAdjustments {
    #[serde(default)]
    pub triggers: Vec<TriggerAdjustment>,
}

/// 调整结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentReport {
    pub applied: usize,
    pub skipped: usize,
}

pub struct TriggerManager {
    store: Arc<dyn RecordStore>,
    scope: SessionScope,
    completion: Arc<dyn CompletionService>,
    registry: EvaluatorRegistry,
}

impl TriggerManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scope: SessionScope,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let registry = EvaluatorRegistry::with_defaults(completion.clone());
        Self {
            store,
            scope,
            completion,
            registry,
        }
    }

    /// 替换评估器表（注册新的触发器种类）
    pub fn with_registry(mut self, registry: EvaluatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 按存储顺序返回全部触发器
    pub async fn get_all_triggers(&self) -> AgentResult<Vec<Trigger>> {
        let records = self.store.list_by_scope(&self.scope.room_id).await?;
        let triggers = materialize_latest(records, key_of)
            .into_iter()
            .map(|r| serde_json::from_value::<TriggerRecord>(r.content).map(|tr| tr.trigger))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(triggers)
    }

    pub async fn get_triggers_by_type(&self, kind: &TriggerKind) -> AgentResult<Vec<Trigger>> {
        Ok(self
            .get_all_triggers()
            .await?
            .into_iter()
            .filter(|t| &t.kind == kind)
            .collect())
    }

    pub async fn get_trigger(&self, id: &str) -> AgentResult<Option<Trigger>> {
        Ok(self.get_all_triggers().await?.into_iter().find(|t| t.id == id))
    }

    /// 新增触发器；已有 polling 时再加 polling 为 no-op（返回 None）
    pub async fn add_trigger(&self, mut trigger: Trigger) -> AgentResult<Option<Trigger>> {
        self.ensure_supported(&trigger.kind)?;
        if trigger.id.trim().is_empty() {
            trigger.id = format!("{}-{}", trigger.kind, uuid::Uuid::new_v4().simple());
        }

        let existing = self.get_all_triggers().await?;
        if existing.iter().any(|t| t.id == trigger.id) {
            return Err(AgentError::Validation(format!(
                "trigger {} already exists",
                trigger.id
            )));
        }

        match trigger.kind {
            TriggerKind::Polling => {
                if existing.iter().any(|t| t.kind == TriggerKind::Polling) {
                    warn!(trigger_id = %trigger.id, "Polling trigger already exists, ignoring add");
                    return Ok(None);
                }
                let interval = trigger
                    .interval_param()
                    .filter(|i| *i >= MIN_POLLING_INTERVAL_MS)
                    .unwrap_or(DEFAULT_INTERVAL_MS);
                trigger.params.insert("interval".into(), Value::from(interval));
            }
            TriggerKind::Dynamic => {
                Self::validate_dynamic(&trigger)?;
                let interval = trigger.interval_ms();
                trigger.params.insert("interval".into(), Value::from(interval));
            }
            _ => {}
        }

        self.write(&trigger).await?;
        info!(trigger_id = %trigger.id, kind = %trigger.kind, "Trigger added");
        Ok(Some(trigger))
    }

    pub async fn remove_trigger(&self, id: &str) -> AgentResult<()> {
        let removed = remove_key(self.store.as_ref(), &self.scope.room_id, id, key_of).await?;
        if removed == 0 {
            return Err(AgentError::NotFound(format!("trigger {id}")));
        }
        info!(trigger_id = %id, "Trigger removed");
        Ok(())
    }

    /// 替换触发器；polling 触发器不可修改（返回 false）
    pub async fn update_trigger(&self, trigger: &Trigger) -> AgentResult<bool> {
        let existing = self
            .get_trigger(&trigger.id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("trigger {}", trigger.id)))?;
        if trigger.kind == TriggerKind::Polling || existing.kind == TriggerKind::Polling {
            warn!(trigger_id = %trigger.id, "Polling triggers cannot be modified");
            return Ok(false);
        }
        self.ensure_supported(&trigger.kind)?;
        if trigger.kind == TriggerKind::Dynamic {
            Self::validate_dynamic(trigger)?;
        }

        self.write(trigger).await?;
        debug!(trigger_id = %trigger.id, "Trigger updated");
        Ok(true)
    }

    pub async fn evaluate_trigger(
        &self,
        trigger: &Trigger,
        context: Option<&ExecutionContext>,
    ) -> AgentResult<TriggerEvaluation> {
        self.evaluate_trigger_at(trigger, context, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// 以给定时钟评估；评估器更新的 last_check / last_evaluation 会被持久化
    pub async fn evaluate_trigger_at(
        &self,
        trigger: &Trigger,
        context: Option<&ExecutionContext>,
        now: i64,
    ) -> AgentResult<TriggerEvaluation> {
        let Some(evaluator) = self.registry.get(&trigger.kind) else {
            return Ok(TriggerEvaluation::not_triggered(
                format!("Unknown trigger type: {}", trigger.kind),
                now,
            ));
        };

        let mut working = trigger.clone();
        let evaluation = evaluator.evaluate(&mut working, context, now).await;
        if working != *trigger {
            self.write(&working).await?;
        }
        debug!(
            trigger_id = %trigger.id,
            triggered = evaluation.is_triggered,
            reason = %evaluation.reason,
            "Trigger evaluated"
        );
        Ok(evaluation)
    }

    /// 请补全服务给出触发器调整并逐条应用；单条失败不影响后续
    pub async fn evaluate_and_adjust_triggers(
        &self,
        context: &ExecutionContext,
    ) -> AgentResult<AdjustmentReport> {
        let prompt = prompts::trigger_adjustment_prompt(context);
        let items = match generate_batch::<TriggerAdjustments>(
            self.completion.as_ref(),
            &prompt,
            "triggers",
        )
        .await
        {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Trigger adjustment request failed");
                return Ok(AdjustmentReport::default());
            }
        };

        let mut report = AdjustmentReport::default();
        for item in items {
            let adjustment = match serde_json::from_value::<TriggerAdjustment>(item) {
                Ok(adjustment) => adjustment,
                Err(e) => {
                    warn!(error = %e, "Malformed trigger adjustment skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.apply_adjustment(&adjustment).await {
                Ok(true) => report.applied += 1,
                Ok(false) => report.skipped += 1,
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => {
                    warn!(action = %adjustment.action, error = %e, "Trigger adjustment skipped");
                    report.skipped += 1;
                }
            }
        }
        info!(applied = report.applied, skipped = report.skipped, "Triggers adjusted");
        Ok(report)
    }

    async fn apply_adjustment(&self, adjustment: &TriggerAdjustment) -> AgentResult<bool> {
        let id = adjustment
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        match adjustment.action.trim().to_lowercase().as_str() {
            "add" => {
                let trigger = Trigger::new(
                    id.unwrap_or_default(),
                    TriggerKind::from(adjustment.kind.as_str()),
                    adjustment.params.clone(),
                );
                Ok(self.add_trigger(trigger).await?.is_some())
            }
            "remove" => {
                let id = id.ok_or_else(|| AgentError::Validation("remove requires an id".into()))?;
                self.remove_trigger(id).await?;
                Ok(true)
            }
            "modify" => {
                let id = id.ok_or_else(|| AgentError::Validation("modify requires an id".into()))?;
                let mut trigger = self
                    .get_trigger(id)
                    .await?
                    .ok_or_else(|| AgentError::NotFound(format!("trigger {id}")))?;
                if !adjustment.kind.trim().is_empty() {
                    trigger.kind = TriggerKind::from(adjustment.kind.as_str());
                }
                trigger
                    .params
                    .extend(adjustment.params.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.update_trigger(&trigger).await
            }
            other => Err(AgentError::Validation(format!(
                "unknown adjustment action: {other}"
            ))),
        }
    }

    /// 只接受注册表中有评估器的种类
    fn ensure_supported(&self, kind: &TriggerKind) -> AgentResult<()> {
        if !self.registry.supports(kind) {
            return Err(AgentError::Validation(format!("unknown trigger type: {kind}")));
        }
        Ok(())
    }

    fn validate_dynamic(trigger: &Trigger) -> AgentResult<()> {
        if trigger.condition().is_none() {
            return Err(AgentError::Validation(format!(
                "dynamic trigger {} requires a condition",
                trigger.id
            )));
        }
        Ok(())
    }

    async fn write(&self, trigger: &Trigger) -> AgentResult<()> {
        let content = serde_json::to_value(TriggerRecord {
            kind: KIND.to_string(),
            text: format!("Trigger: {} ({})", trigger.id, trigger.kind),
            trigger: trigger.clone(),
        })?;
        replace_record(self.store.as_ref(), self.scope.record(content), &trigger.id, key_of).await?;
        Ok(())
    }
}
