//! Prompt 模板：`{{name}}` 占位符由 render 替换

/// 触发器命中后生成智能体下一步动作
pub const ACTION_TEMPLATE: &str = r#"# Role
You are {{agentName}}, an autonomous agent working through a fixed sequence of tasks.
Stay focused on the current task and use the notes you have collected so far.

# All Tasks
{{tasks}}

# Current Task
{{currentTask}}

# Notes
{{notes}}

# Active Triggers
{{triggers}}

# Activation
{{activation}}

# Recent Messages
{{recentMessages}}

# Instructions
Write the next message for {{agentName}}. If an action is needed, name it in "action".
Respond with a JSON object: {"text": "<message>", "action": "<action name or NONE>"}
"#;

/// 任务完成判定
pub const TASK_COMPLETION_TEMPLATE: &str = r#"Decide whether the following task is complete, based on the recent messages and notes.

Task Description: {{description}}
Definition of Done: {{definitionOfDone}}

Notes for this task:
{{taskNotes}}

Recent messages:
{{recentMessages}}

Answer with {"isComplete": true|false, "reason": "<explanation>"}.
"#;

/// dynamic 触发器条件评估
pub const TRIGGER_EVALUATION_TEMPLATE: &str = r#"Decide whether the following trigger condition is currently met.

Condition: {{condition}}

Current Task:
{{currentTask}}

Notes:
{{notes}}

Recent messages:
{{recentMessages}}

Answer with {"isTriggered": true|false, "reason": "<explanation>", "response": <optional data>}.
"#;

/// 任务完成后调整触发器
pub const TRIGGER_ADJUSTMENT_TEMPLATE: &str = r#"A task has just been completed. Decide which triggers should be active for the work that follows.

Completed Task: {{completedTask}}

Next Task:
{{currentTask}}

All Tasks:
{{tasks}}

Active Triggers:
{{triggers}}

Notes:
{{notes}}

Recent messages:
{{recentMessages}}

Rules:
- Available trigger types: polling, dynamic, price.
- Exactly one polling trigger exists; it cannot be modified, only removed.
- A dynamic trigger needs params.condition (natural language) and params.interval (milliseconds).
- "remove" and "modify" must reference an existing trigger id.

Answer with {"triggers": [{"type": "...", "params": {...}, "action": "add|remove|modify", "id": "<optional>"}]}.
Return an empty list when nothing should change.
"#;

/// 笔记协调
pub const NOTE_EVALUATION_TEMPLATE: &str = r#"Review the agent's notes and keep them accurate and useful for the remaining tasks.

Current Task:
{{currentTask}}

Upcoming Tasks:
{{nextTasks}}

Existing Notes:
{{notes}}

Recent messages:
{{recentMessages}}

Add notes for durable facts worth remembering, update notes that changed, remove notes that are stale.
Answer with {"notes": [{"action": "add|update|remove", "key": "...", "value": <any>, "metadata": {"taskId": "...", "category": "...", "priority": 1, "tags": ["..."]}, "reason": "..."}]}.
Return an empty list when nothing should change.
"#;

/// 单遍替换模板中的 `{{key}}` 占位符；代入的值不再被展开，未知占位符原样保留
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_occurrence() {
        let out = render("{{a}} and {{a}}, {{b}}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x, y");
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let out = render(
            "Task: {{currentTask}}\nNotes: {{notes}}",
            &[("currentTask", "copy {{notes}} here"), ("notes", "strike=70k")],
        );
        assert_eq!(out, "Task: copy {{notes}} here\nNotes: strike=70k");
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed() {
        assert_eq!(render("{{a}} {{zzz}} {{a", &[("a", "x")]), "x {{zzz}} {{a");
    }

    #[test]
    fn test_action_template_placeholders_all_known() {
        let out = render(
            ACTION_TEMPLATE,
            &[
                ("agentName", "n"),
                ("tasks", "t"),
                ("currentTask", "c"),
                ("notes", "o"),
                ("triggers", "g"),
                ("activation", "a"),
                ("recentMessages", "r"),
            ],
        );
        assert!(!out.contains("{{"));
    }
}
