//! Oracle 提示词
//!
//! - 决策提示词：有序步骤、已完成步骤、最近若干条执行记忆，要求输出 `{next_step, required_tools, reasoning}`
//! - 参数补全提示词：单个动作的模板参数 + 上下文，要求输出补全后的参数对象
//! - 工具提议提示词：工具定义（JSON Schema）+ 步骤，要求输出 `{"tool_calls": [...]}`

use std::collections::BTreeMap;

use serde_json::Value;

use crate::actions::ActionEntry;
use crate::decision::WORKFLOW_COMPLETE;
use crate::workflow::ExecutionMemoryEntry;

fn numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

fn memory_section(recent: &[ExecutionMemoryEntry]) -> String {
    if recent.is_empty() {
        return "(empty)".to_string();
    }
    recent
        .iter()
        .map(|e| {
            serde_json::json!({
                "step": e.step,
                "action": e.action,
                "observation": e.observation,
                "feedback": e.feedback,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_section(user_context: &BTreeMap<String, String>) -> String {
    if user_context.is_empty() {
        return "(none)".to_string();
    }
    user_context
        .iter()
        .map(|(k, v)| format!("- {k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 决策提示词
pub fn decision_prompt<'a>(
    steps: &[String],
    completed: impl Iterator<Item = &'a str>,
    recent: &[ExecutionMemoryEntry],
) -> String {
    let completed: Vec<&str> = completed.collect();
    let completed = if completed.is_empty() {
        "(none)".to_string()
    } else {
        completed
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"You are the action decision agent of a workflow automation system.
Decide which workflow step should run next, based on the workflow, the steps already completed and the execution memory.

Rules:
- If the feedback of the latest memory entry is "success", continue with the next step as the workflow logic dictates.
- If a step's condition does not apply to the observed data, skip it by choosing a later step.
- Never choose a step that is already completed.
- When no remaining step needs to run, set next_step to "{complete}".
- next_step must be copied verbatim from the workflow.

### Workflow
{steps}

### Completed steps
{completed}

### Execution memory (most recent last)
{memory}

Respond with a single JSON object and nothing else:
{{"next_step": "<step text or {complete}>", "required_tools": ["<tool name>"], "reasoning": "<short reasoning>"}}"#,
        complete = WORKFLOW_COMPLETE,
        steps = numbered(steps),
        completed = completed,
        memory = memory_section(recent),
    )
}

/// 参数补全提示词：模板中仍含 `{...}` 占位符或缺少必填参数时使用
pub fn action_params_prompt(
    step: &str,
    action: &ActionEntry,
    params: &Value,
    user_context: &BTreeMap<String, String>,
    recent: &[ExecutionMemoryEntry],
) -> String {
    format!(
        r#"You are the action execution agent of a workflow automation system.
Fill in the parameters needed to execute one action. Replace every unresolved "{{placeholder}}" value using the user context and the execution memory; keep values that are already concrete.

### Step
{step}

### Action
{name} (type: {handler})

### Current parameters
{params}

### User context
{context}

### Execution memory (most recent last)
{memory}

Respond with a single JSON object containing the complete parameters and nothing else."#,
        step = step,
        name = action.name,
        handler = action.handler_type,
        params = params,
        context = context_section(user_context),
        memory = memory_section(recent),
    )
}

/// 工具提议提示词
pub fn tool_proposal_prompt(
    step: &str,
    tool_definitions: &Value,
    user_context: &BTreeMap<String, String>,
    recent: &[ExecutionMemoryEntry],
) -> String {
    let defs = serde_json::to_string_pretty(tool_definitions).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are the action execution agent of a workflow automation system.
Choose the tool calls that carry out the workflow step below, in order. Use only the tools defined here.

### Step
{step}

### Tools (JSON Schema)
```json
{defs}
```

### User context
{context}

### Execution memory (most recent last)
{memory}

Respond with a single JSON object and nothing else:
{{"tool_calls": [{{"tool": "<tool name>", "parameters": {{}}}}]}}"#,
        step = step,
        defs = defs,
        context = context_section(user_context),
        memory = memory_section(recent),
    )
}

/// 用户回复解读提示词：校验回复并抽取槽位
pub fn user_reply_prompt(question: &str, reply: &str, slot: &str) -> String {
    format!(
        r#"You are the user interaction agent of a workflow automation system.
1. Verify whether the user's reply satisfies the condition. Set "input_validation" to "success" if it does, otherwise "fail".
2. Extract every entity in the reply as a slot. Name the slot that answers the question "{slot}".
3. Write a one-line acknowledgment for the user. If the reply is a question, say you are working on it and ask the user to wait.

### Question asked to the user
{question}

### User's reply
{reply}

### Condition
The reply indicates or includes {slot}

Respond with a single JSON object and nothing else:
{{"thought": "...", "input_validation": "success", "user_response": "...", "slots": {{"{slot}": "..."}}}}"#,
        question = question,
        reply = reply,
        slot = slot,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::HandlerType;

    #[test]
    fn test_decision_prompt_contents() {
        let steps = vec!["Check status".to_string(), "Notify if delayed".to_string()];
        let recent = vec![ExecutionMemoryEntry {
            step: "Check status".to_string(),
            action: "check_request_status".to_string(),
            observation: serde_json::json!({"note": "ok"}),
            feedback: "success".to_string(),
        }];
        let p = decision_prompt(&steps, ["Check status"].into_iter(), &recent);
        assert!(p.contains("1. Check status\n2. Notify if delayed"));
        assert!(p.contains("- Check status"));
        assert!(p.contains("check_request_status"));
        assert!(p.contains(WORKFLOW_COMPLETE));
        assert!(p.contains(r#""next_step""#));
    }

    #[test]
    fn test_user_reply_prompt_names_slot() {
        let p = user_reply_prompt("Please provide your request ID.", "it's 103", "request_id");
        assert!(p.contains("it's 103"));
        assert!(p.contains(r#""slots": {"request_id": "..."}"#));
        assert!(p.contains("includes request_id"));
    }

    #[test]
    fn test_empty_sections() {
        let p = decision_prompt(&["a".to_string()], std::iter::empty(), &[]);
        assert!(p.contains("### Completed steps\n(none)"));
        assert!(p.contains("(empty)"));
    }

    #[test]
    fn test_action_params_prompt() {
        let action = ActionEntry::new("notify_manager", HandlerType::SendNotification);
        let mut ctx = BTreeMap::new();
        ctx.insert("request_id".to_string(), "103".to_string());
        let p = action_params_prompt(
            "Notify manager",
            &action,
            &serde_json::json!({"recipient": "{request.manager_email}"}),
            &ctx,
            &[],
        );
        assert!(p.contains("notify_manager (type: send_notification)"));
        assert!(p.contains("- request_id: 103"));
        assert!(p.contains("{request.manager_email}"));
    }
}
