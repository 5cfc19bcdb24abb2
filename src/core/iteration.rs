//! 迭代编排器：一轮完整的「触发 → 回复 → 动作 → 完成判定 → 协调」
//!
//! 一轮中不做内部重试。补全服务失败在各环节内被吞掉，存储失败通过 `?` 中止本轮。

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::core::actions::{
    AcknowledgeActionHandler, ActionHandler, MessageLog, ResponseEvaluator, RESPONSE,
    TRIGGER_ACTIVATION,
};
use crate::core::context::{ContextComposer, ExecutionContext};
use crate::core::error::AgentResult;
use crate::llm::CompletionService;
use crate::notes::NoteManager;
use crate::prompts;
use crate::tasks::{TaskManager, TaskStatus};
use crate::triggers::{TriggerEvaluation, TriggerManager};

/// 一轮迭代走到了哪一步
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// 没有未完成任务
    QueueExhausted,
    /// 没有触发器命中
    NotTriggered { task_id: String },
    /// 补全服务没有给出回复
    NoResponse { task_id: String },
    /// 已回复但任务未完成
    Incomplete { task_id: String },
    /// 任务完成，已执行触发器与笔记协调
    Completed { task_id: String },
}

/// 编排器依赖的组件
#[derive(Clone)]
pub struct AgentRuntime {
    pub agent_name: String,
    pub tasks: Arc<TaskManager>,
    pub triggers: Arc<TriggerManager>,
    pub notes: Arc<NoteManager>,
    pub messages: MessageLog,
    pub completion: Arc<dyn CompletionService>,
    pub composer: Arc<ContextComposer>,
}

pub struct Orchestrator {
    runtime: AgentRuntime,
    handler: Arc<dyn ActionHandler>,
    evaluators: Vec<Arc<dyn ResponseEvaluator>>,
}

impl Orchestrator {
    pub fn new(runtime: AgentRuntime) -> Self {
        Self {
            runtime,
            handler: Arc::new(AcknowledgeActionHandler),
            evaluators: Vec::new(),
        }
    }

    pub fn with_action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ResponseEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    /// 执行一轮
    pub async fn run_cycle(&self) -> AgentResult<CycleOutcome> {
        let rt = &self.runtime;

        let Some(mut task) = rt.tasks.current_task().await? else {
            info!("All tasks completed");
            return Ok(CycleOutcome::QueueExhausted);
        };
        if task.status == TaskStatus::Pending {
            task = rt.tasks.start_task(&task).await?;
        }
        let task_id = task.id.clone();
        info!(task_id = %task_id, description = %task.description, "Processing task");

        let context = rt.composer.compose(None).await?;
        let Some(activation) = self.first_triggered(&context).await? else {
            debug!(task_id = %task_id, "No trigger fired");
            return Ok(CycleOutcome::NotTriggered { task_id });
        };

        rt.messages
            .append(
                TRIGGER_ACTIVATION,
                &format!("Trigger activated: {}", activation.reason),
                json!({ "taskId": task_id, "evaluation": activation }),
            )
            .await?;

        let context = rt.composer.compose(Some(activation.clone())).await?;
        let content = match rt.completion.generate_freeform(&prompts::action_prompt(&context)).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                error!(task_id = %task_id, "Completion service returned no response");
                return Ok(CycleOutcome::NoResponse { task_id });
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Response generation failed");
                return Ok(CycleOutcome::NoResponse { task_id });
            }
        };

        let response = rt.messages.append_content(RESPONSE, &content).await?;
        self.handler.process(&response, &rt.messages).await?;

        let context = rt.composer.compose(Some(activation.clone())).await?;
        for evaluator in &self.evaluators {
            if let Err(e) = evaluator.evaluate(&response, &context).await {
                if e.is_persistence() {
                    return Err(e);
                }
                warn!(evaluator = evaluator.name(), error = %e, "Response evaluator failed");
            }
        }
        let context = rt.composer.compose(Some(activation)).await?;

        if !rt.tasks.evaluate_task_completion(&task, &context).await {
            info!(task_id = %task_id, "Task not yet complete");
            return Ok(CycleOutcome::Incomplete { task_id });
        }

        rt.tasks.complete_task(&task).await?;
        let context = rt.composer.compose(None).await?;
        rt.triggers.evaluate_and_adjust_triggers(&context).await?;
        rt.notes.evaluate_notes(&context).await?;
        Ok(CycleOutcome::Completed { task_id })
    }

    /// 按存储顺序评估触发器，返回第一个命中的结果
    async fn first_triggered(&self, context: &ExecutionContext) -> AgentResult<Option<TriggerEvaluation>> {
        for trigger in &context.triggers {
            let evaluation = self
                .runtime
                .triggers
                .evaluate_trigger(trigger, Some(context))
                .await?;
            if evaluation.is_triggered {
                info!(trigger_id = %trigger.id, reason = %evaluation.reason, "Trigger fired");
                return Ok(Some(evaluation));
            }
        }
        Ok(None)
    }
}
