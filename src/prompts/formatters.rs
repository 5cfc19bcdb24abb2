//! 把任务 / 触发器 / 笔记 / 对话渲染成 prompt 片段

use crate::notes::Note;
use crate::store::Record;
use crate::tasks::Task;
use crate::triggers::{Trigger, TriggerEvaluation};

const NONE: &str = "(none)";

pub fn format_task(task: Option<&Task>) -> String {
    let Some(task) = task else {
        return "No current task. All tasks are completed.".to_string();
    };
    let kinds: Vec<&str> = task.trigger_types.iter().map(|k| k.as_str()).collect();
    let mut out = format!(
        "[{}] {} (status: {}, order: {})\nDefinition of Done: {}",
        task.id,
        task.description,
        task.status.as_str(),
        task.order,
        task.definition_of_done
    );
    if !kinds.is_empty() {
        out.push_str(&format!("\nTrigger types: {}", kinds.join(", ")));
    }
    if !task.data.is_empty() {
        out.push_str(&format!("\nData: {}", serde_json::Value::Object(task.data.clone())));
    }
    out
}

pub fn format_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> String {
    let lines: Vec<String> = tasks
        .into_iter()
        .map(|t| format!("{}. [{}] {} ({})", t.order, t.id, t.description, t.status.as_str()))
        .collect();
    if lines.is_empty() {
        NONE.to_string()
    } else {
        lines.join("\n")
    }
}

pub fn format_triggers(triggers: &[Trigger]) -> String {
    if triggers.is_empty() {
        return NONE.to_string();
    }
    triggers
        .iter()
        .map(|t| {
            let params = serde_json::Value::Object(t.params.clone());
            match &t.last_evaluation {
                Some(e) => format!(
                    "- id={} type={} params={} last={} ({})",
                    t.id, t.kind, params, e.is_triggered, e.reason
                ),
                None => format!("- id={} type={} params={}", t.id, t.kind, params),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_notes<'a>(notes: impl IntoIterator<Item = &'a Note>) -> String {
    let lines: Vec<String> = notes
        .into_iter()
        .map(|n| match n.task_id() {
            Some(task_id) => format!("- {} = {} (task: {})", n.key, n.value, task_id),
            None => format!("- {} = {}", n.key, n.value),
        })
        .collect();
    if lines.is_empty() {
        NONE.to_string()
    } else {
        lines.join("\n")
    }
}

/// 对话记录：`<kind>: <text>`
pub fn format_messages(records: &[Record]) -> String {
    let lines: Vec<String> = records
        .iter()
        .filter_map(|r| {
            let text = r.content_str("text")?;
            let kind = r.content_str("kind").unwrap_or("message");
            Some(format!("{kind}: {text}"))
        })
        .collect();
    if lines.is_empty() {
        NONE.to_string()
    } else {
        lines.join("\n")
    }
}

pub fn format_activation(activation: Option<&TriggerEvaluation>) -> String {
    match activation {
        Some(e) if e.is_triggered => match &e.response {
            Some(resp) => format!("Triggered: {} ({})", e.reason, resp),
            None => format!("Triggered: {}", e.reason),
        },
        _ => NONE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::NoteMetadata;
    use crate::tasks::TaskStatus;
    use serde_json::json;

    #[test]
    fn test_format_task_none() {
        assert!(format_task(None).contains("All tasks are completed"));
    }

    #[test]
    fn test_format_task_includes_definition_of_done() {
        let task = Task {
            id: "t1".into(),
            description: "Analyze".into(),
            definition_of_done: "Report written".into(),
            status: TaskStatus::InProgress,
            trigger_types: Default::default(),
            order: 0,
            data: Default::default(),
            created_at: 0,
        };
        let out = format_task(Some(&task));
        assert!(out.contains("[t1] Analyze"));
        assert!(out.contains("in_progress"));
        assert!(out.contains("Report written"));
    }

    #[test]
    fn test_format_notes_with_task() {
        let note = Note {
            id: "n".into(),
            key: "trend".into(),
            value: json!("up"),
            metadata: Some(NoteMetadata::for_task("t1")),
            timestamp: 0,
        };
        assert_eq!(format_notes([&note]), "- trend = \"up\" (task: t1)");
        assert_eq!(format_notes(std::iter::empty::<&Note>()), "(none)");
    }
}
