//! Prompt 组装：模板 + 上下文格式化

pub mod formatters;
pub mod templates;

use crate::core::context::ExecutionContext;
use crate::tasks::Task;

pub use formatters::{
    format_activation, format_messages, format_notes, format_task, format_tasks, format_triggers,
};
pub use templates::render;

/// 默认 system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an autonomous agent that completes a fixed sequence of tasks. Be concise and precise.";

pub fn action_prompt(ctx: &ExecutionContext) -> String {
    render(
        templates::ACTION_TEMPLATE,
        &[
            ("agentName", &ctx.agent_name),
            ("tasks", &format_tasks(&ctx.tasks)),
            ("currentTask", &format_task(ctx.current_task.as_ref())),
            ("notes", &format_notes(&ctx.notes)),
            ("triggers", &format_triggers(&ctx.triggers)),
            ("activation", &format_activation(ctx.activation.as_ref())),
            ("recentMessages", &format_messages(&ctx.recent_messages)),
        ],
    )
}

pub fn task_completion_prompt(task: &Task, ctx: &ExecutionContext) -> String {
    render(
        templates::TASK_COMPLETION_TEMPLATE,
        &[
            ("description", &task.description),
            ("definitionOfDone", &task.definition_of_done),
            ("taskNotes", &format_notes(ctx.notes_for_task(&task.id))),
            ("recentMessages", &format_messages(&ctx.recent_messages)),
        ],
    )
}

pub fn trigger_evaluation_prompt(condition: &str, ctx: &ExecutionContext) -> String {
    render(
        templates::TRIGGER_EVALUATION_TEMPLATE,
        &[
            ("condition", condition),
            ("currentTask", &format_task(ctx.current_task.as_ref())),
            ("notes", &format_notes(&ctx.notes)),
            ("recentMessages", &format_messages(&ctx.recent_messages)),
        ],
    )
}

pub fn trigger_adjustment_prompt(ctx: &ExecutionContext) -> String {
    let completed = ctx
        .last_completed_task()
        .map(|t| format!("[{}] {}", t.id, t.description))
        .unwrap_or_else(|| "(none)".to_string());
    render(
        templates::TRIGGER_ADJUSTMENT_TEMPLATE,
        &[
            ("completedTask", &completed),
            ("currentTask", &format_task(ctx.current_task.as_ref())),
            ("tasks", &format_tasks(&ctx.tasks)),
            ("triggers", &format_triggers(&ctx.triggers)),
            ("notes", &format_notes(&ctx.notes)),
            ("recentMessages", &format_messages(&ctx.recent_messages)),
        ],
    )
}

pub fn note_evaluation_prompt(ctx: &ExecutionContext) -> String {
    render(
        templates::NOTE_EVALUATION_TEMPLATE,
        &[
            ("currentTask", &format_task(ctx.current_task.as_ref())),
            ("nextTasks", &format_tasks(ctx.upcoming_tasks())),
            ("notes", &format_notes(&ctx.notes)),
            ("recentMessages", &format_messages(&ctx.recent_messages)),
        ],
    )
}
