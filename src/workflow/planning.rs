//! 步骤规划：把选中的 SOP 步骤变成零个或多个工具调用
//!
//! - repository 模式：解析到动作 → 守卫 → 用 api_path / param_template 构造参数
//!   （`{key}` 取 userContext，`{request.<field>}` 取最新请求记录）→ 仍有占位符时请 Oracle 补全
//! - oracle_tools 模式：Oracle 根据工具定义直接提议 `tool_calls`；提议无法解析时本步退回 repository 模式
//!
//! AskUserInput 的回复先交给 Oracle 校验并抽取槽位，再写入 userContext；Oracle 不可用时保留原文。

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actions::{ActionEntry, ActionRepository, HandlerType, StepResolver};
use crate::backend::RequestRecord;
use crate::core::WorkflowError;
use crate::decision::{
    action_params_prompt, parse_param_object, parse_reply_interpretation, parse_tool_proposals,
    tool_proposal_prompt, user_reply_prompt,
};
use crate::llm::{generate, LlmClient};
use crate::tools::ToolKind;
use crate::workflow::WorkflowState;

/// 步骤执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    #[default]
    Repository,
    OracleTools,
}

/// 分发目标：按动作的处理器类型，或按 Oracle 给出的工具名
#[derive(Debug, Clone, PartialEq)]
pub enum ToolTarget {
    Handler(HandlerType),
    Named(String),
}

impl ToolTarget {
    pub fn name(&self) -> String {
        match self {
            ToolTarget::Handler(h) => h.to_string(),
            ToolTarget::Named(n) => n.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub target: ToolTarget,
    pub params: Value,
}

impl ToolInvocation {
    /// 只读的 ApiCall（GET，未指定 method 时默认 GET）可以安全重放；写操作与用户交互不可
    pub fn is_idempotent_read(&self) -> bool {
        let api_call = match &self.target {
            ToolTarget::Handler(handler) => *handler == HandlerType::ApiCall,
            ToolTarget::Named(name) => ToolKind::parse(name) == Some(ToolKind::ApiCall),
        };
        api_call
            && self
                .params
                .get("method")
                .and_then(Value::as_str)
                .map(|m| m.trim().eq_ignore_ascii_case("GET"))
                .unwrap_or(true)
    }
}

/// 一个步骤的规划结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepPlan {
    Invoke {
        /// 动作名（oracle_tools 模式下为 `oracle:` + 工具名列表）
        action: String,
        /// 语义匹配得分
        score: Option<f32>,
        /// AskUserInput 的回复写入 userContext 的键
        context_key: String,
        invocations: Vec<ToolInvocation>,
    },
    /// 守卫不满足：零次工具调用
    Skipped { action: String, reason: String },
}

pub struct StepPlanner {
    resolver: StepResolver,
    repository: Arc<ActionRepository>,
    llm: Arc<dyn LlmClient>,
    mode: StepMode,
    fill_missing_params: bool,
    interpret_user_replies: bool,
    memory_window: usize,
    oracle_timeout: Duration,
    tool_definitions: Value,
}

impl StepPlanner {
    pub fn new(
        resolver: StepResolver,
        repository: Arc<ActionRepository>,
        llm: Arc<dyn LlmClient>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            repository,
            llm,
            mode: StepMode::default(),
            fill_missing_params: true,
            interpret_user_replies: true,
            memory_window: 3,
            oracle_timeout,
            tool_definitions: Value::Array(vec![]),
        }
    }

    pub fn with_mode(mut self, mode: StepMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fill_missing_params(mut self, enabled: bool) -> Self {
        self.fill_missing_params = enabled;
        self
    }

    pub fn with_interpret_user_replies(mut self, enabled: bool) -> Self {
        self.interpret_user_replies = enabled;
        self
    }

    pub fn with_memory_window(mut self, window: usize) -> Self {
        self.memory_window = window;
        self
    }

    /// oracle_tools 模式下注入提示词的工具定义
    pub fn with_tool_definitions(mut self, definitions: Value) -> Self {
        self.tool_definitions = definitions;
        self
    }

    pub fn repository(&self) -> &ActionRepository {
        &self.repository
    }

    pub async fn plan(&self, step: &str, state: &WorkflowState) -> Result<StepPlan, WorkflowError> {
        if self.mode == StepMode::OracleTools {
            match self.propose_tools(step, state).await {
                Ok(plan) => return Ok(plan),
                Err(e) => tracing::warn!(step, error = %e, "tool proposal unusable, using action repository"),
            }
        }
        self.plan_from_repository(step, state).await
    }

    async fn propose_tools(&self, step: &str, state: &WorkflowState) -> Result<StepPlan, WorkflowError> {
        let prompt = tool_proposal_prompt(
            step,
            &self.tool_definitions,
            &state.user_context,
            state.memory.recent(self.memory_window),
        );
        let raw = generate(self.llm.as_ref(), &prompt, self.oracle_timeout).await?;
        let proposals = parse_tool_proposals(&raw)?;
        let names: Vec<&str> = proposals.iter().map(|p| p.tool.as_str()).collect();
        let action = format!("oracle:{}", names.join(","));
        let invocations = proposals
            .into_iter()
            .map(|p| ToolInvocation {
                target: ToolTarget::Named(p.tool),
                params: if p.parameters.is_null() {
                    Value::Object(Map::new())
                } else {
                    p.parameters
                },
            })
            .collect();
        Ok(StepPlan::Invoke {
            action,
            score: None,
            context_key: step.to_string(),
            invocations,
        })
    }

    async fn plan_from_repository(&self, step: &str, state: &WorkflowState) -> Result<StepPlan, WorkflowError> {
        let resolution = self.resolver.resolve(step, &self.repository).await?;
        let entry = resolution.entry;
        let request = state.memory.latest_request();

        if let Some(guard) = &entry.guard {
            if let Err(reason) = guard.evaluate(request.as_ref(), Utc::now()) {
                tracing::info!(step, action = %entry.name, reason = %reason, "guard not satisfied");
                return Ok(StepPlan::Skipped {
                    action: entry.name,
                    reason,
                });
            }
        }

        let facts = Facts {
            user_context: &state.user_context,
            request: request.as_ref(),
        };
        let mut params = build_params(step, &entry, &facts)?;
        if self.fill_missing_params && has_placeholders(&params) {
            params = self.fill_params(step, &entry, params, state).await;
        }

        let context_key = entry
            .interaction_metadata
            .first()
            .cloned()
            .unwrap_or_else(|| step.to_string());
        Ok(StepPlan::Invoke {
            action: entry.name.clone(),
            score: Some(resolution.score),
            context_key,
            invocations: vec![ToolInvocation {
                target: ToolTarget::Handler(entry.handler_type),
                params,
            }],
        })
    }

    /// 把用户回复转成 userContext 更新：`slot` 取抽取出的槽位值，其余槽位按原键写入。
    /// Oracle 不可用、输出无法解析、回复未通过校验或没有对应槽位时，`slot` 保留回复原文。
    pub async fn interpret_reply(&self, question: &str, reply: &str, slot: &str) -> Vec<(String, String)> {
        let verbatim = vec![(slot.to_string(), reply.to_string())];
        if !self.interpret_user_replies {
            return verbatim;
        }
        let prompt = user_reply_prompt(question, reply, slot);
        let parsed = match generate(self.llm.as_ref(), &prompt, self.oracle_timeout).await {
            Ok(raw) => parse_reply_interpretation(&raw),
            Err(e) => Err(e),
        };
        let interpretation = match parsed {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(slot, error = %e, "reply interpretation failed, keeping raw reply");
                return verbatim;
            }
        };
        if !interpretation.is_valid() {
            tracing::warn!(slot, reply, "reply did not satisfy the question, keeping raw reply");
            return verbatim;
        }
        if let Some(ack) = &interpretation.user_response {
            tracing::debug!(slot, ack = %ack, "reply acknowledged");
        }

        let Some((matched_key, value)) = interpretation.slot_value(slot) else {
            tracing::warn!(slot, "no slot extracted for key, keeping raw reply");
            return verbatim;
        };
        let mut updates: Vec<(String, String)> = interpretation
            .slot_pairs()
            .filter(|(k, _)| *k != matched_key && k != slot)
            .collect();
        tracing::info!(slot, value = %value, "slot extracted from reply");
        updates.push((slot.to_string(), value));
        updates
    }

    /// 请 Oracle 补全仍含占位符的参数；失败时保留模板值
    async fn fill_params(&self, step: &str, entry: &ActionEntry, params: Value, state: &WorkflowState) -> Value {
        let prompt = action_params_prompt(
            step,
            entry,
            &params,
            &state.user_context,
            state.memory.recent(self.memory_window),
        );
        let filled = match generate(self.llm.as_ref(), &prompt, self.oracle_timeout).await {
            Ok(raw) => parse_param_object(&raw),
            Err(e) => Err(e),
        };
        match filled {
            Ok(values) => merge_filled(params, values),
            Err(e) => {
                tracing::warn!(action = %entry.name, error = %e, "parameter fill failed, keeping template values");
                params
            }
        }
    }
}

/// 占位符取值来源
pub struct Facts<'a> {
    pub user_context: &'a BTreeMap<String, String>,
    pub request: Option<&'a RequestRecord>,
}

impl Facts<'_> {
    /// `{request.status}` 只查请求记录；`{request_id}` 先查 userContext 再查请求记录
    pub fn lookup(&self, key: &str) -> Option<String> {
        if let Some(field) = key.strip_prefix("request.") {
            return self.request.and_then(|r| r.field(field));
        }
        self.user_context
            .get(key)
            .cloned()
            .or_else(|| self.request.and_then(|r| r.field(key)))
    }
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-zA-Z0-9_.]+)\}").ok())
        .as_ref()
}

/// 替换字符串中的占位符；未知占位符原样保留
pub fn substitute(text: &str, facts: &Facts<'_>) -> String {
    match placeholder_re() {
        Some(re) => re
            .replace_all(text, |caps: &Captures| {
                facts.lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned(),
        None => text.to_string(),
    }
}

fn substitute_value(value: Value, facts: &Facts<'_>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(&s, facts)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| substitute_value(v, facts)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_value(v, facts)))
                .collect(),
        ),
        other => other,
    }
}

fn is_unresolved(s: &str) -> bool {
    placeholder_re().map(|re| re.is_match(s)).unwrap_or(false)
}

/// 参数中是否还有未替换的占位符
pub fn has_placeholders(value: &Value) -> bool {
    match value {
        Value::String(s) => is_unresolved(s),
        Value::Array(items) => items.iter().any(has_placeholders),
        Value::Object(map) => map.values().any(has_placeholders),
        _ => false,
    }
}

/// 由动作定义构造分发参数
pub fn build_params(step: &str, entry: &ActionEntry, facts: &Facts<'_>) -> Result<Value, WorkflowError> {
    let template = entry.param_template.trim();
    let mut params = if template.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(template) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(WorkflowError::DispatchError(format!(
                    "param template of '{}' is not a JSON object",
                    entry.name
                )))
            }
            Err(e) => {
                return Err(WorkflowError::DispatchError(format!(
                    "invalid param template of '{}': {e}",
                    entry.name
                )))
            }
        }
    };

    match entry.handler_type {
        HandlerType::ApiCall => {
            if !entry.api_path.is_empty() {
                params.insert("endpoint".to_string(), Value::String(entry.api_path.clone()));
            }
            if !params.contains_key("method") {
                let method = entry.method.clone().unwrap_or_else(|| "GET".to_string());
                params.insert("method".to_string(), Value::String(method));
            }
        }
        HandlerType::AskUserInput => {
            params
                .entry("prompt")
                .or_insert_with(|| Value::String(step.to_string()));
        }
        HandlerType::ShowMessage => {
            params
                .entry("message")
                .or_insert_with(|| Value::String(step.to_string()));
        }
        HandlerType::ExternalKnowledge => {
            params
                .entry("search_query")
                .or_insert_with(|| Value::String(step.to_string()));
        }
        HandlerType::CreateTicket | HandlerType::SendNotification => {}
    }

    Ok(substitute_value(Value::Object(params), facts))
}

/// Oracle 补全结果只覆盖缺失或仍含占位符的键
fn merge_filled(params: Value, filled: Map<String, Value>) -> Value {
    let Value::Object(mut current) = params else {
        return params;
    };
    for (key, value) in filled {
        let replace = match current.get(&key) {
            None => true,
            Some(existing) => has_placeholders(existing),
        };
        if replace && !has_placeholders(&value) {
            current.insert(key, value);
        }
    }
    Value::Object(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::drive_access_actions;
    use crate::backend::RequestStatus;
    use crate::llm::{FailingLlmClient, KeywordEmbedder, ScriptedLlmClient};
    use crate::workflow::ExecutionMemoryEntry;
    use serde_json::json;

    fn planner(llm: impl LlmClient + 'static) -> StepPlanner {
        StepPlanner::new(
            StepResolver::new(Arc::new(KeywordEmbedder::default()), None),
            Arc::new(ActionRepository::new(drive_access_actions())),
            Arc::new(llm),
            Duration::from_secs(5),
        )
    }

    fn observed(state: &mut WorkflowState, id: u64, status: &str, hours: i64, manager: Option<&str>) {
        let mut request = json!({
            "requestId": id,
            "status": status,
            "createdAt": (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339(),
        });
        if let Some(m) = manager {
            request["managerEmail"] = json!(m);
        }
        state.memory.push(ExecutionMemoryEntry {
            step: "Check request status".to_string(),
            action: "check_request_status".to_string(),
            observation: json!({"outcomes": [{"tool": "api_call", "params": {}, "result": {"success": true, "request": request}}]}),
            feedback: "success".to_string(),
        });
    }

    #[test]
    fn test_substitute() {
        let mut ctx = BTreeMap::new();
        ctx.insert("request_id".to_string(), "103".to_string());
        let facts = Facts {
            user_context: &ctx,
            request: None,
        };
        assert_eq!(substitute("/requests/{request_id}", &facts), "/requests/103");
        assert_eq!(substitute("{request.status} {x}", &facts), "{request.status} {x}");
    }

    #[test]
    fn test_build_params_for_api_call() {
        let mut ctx = BTreeMap::new();
        ctx.insert("request_id".to_string(), "101".to_string());
        let facts = Facts {
            user_context: &ctx,
            request: None,
        };
        let repo = ActionRepository::new(drive_access_actions());
        let entry = repo.lookup("check_request_status").unwrap();
        let params = build_params("Check request status", entry, &facts).unwrap();
        assert_eq!(params["endpoint"], "/requests/101");
        assert_eq!(params["method"], "GET");
        assert!(!has_placeholders(&params));
    }

    #[test]
    fn test_invalid_template_is_dispatch_error() {
        let entry = ActionEntry::new("broken", HandlerType::ShowMessage).with_param_template("{not json");
        let ctx = BTreeMap::new();
        let facts = Facts {
            user_context: &ctx,
            request: None,
        };
        assert!(matches!(
            build_params("x", &entry, &facts),
            Err(WorkflowError::DispatchError(_))
        ));
    }

    #[tokio::test]
    async fn test_repository_plan_uses_request_facts() {
        let mut state = WorkflowState::new("Check request status\nCreate reapproval ticket");
        observed(&mut state, 103, "disapproved", 80, Some("boss@company.com"));
        let plan = planner(FailingLlmClient)
            .plan("Create reapproval ticket", &state)
            .await
            .unwrap();
        let StepPlan::Invoke { action, invocations, .. } = plan else {
            panic!("expected invocation");
        };
        assert_eq!(action, "create_reapproval_ticket");
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].target, ToolTarget::Handler(HandlerType::CreateTicket));
        assert_eq!(invocations[0].params["request_id"], "103");
        assert!(invocations[0].params["description"].as_str().unwrap().contains("disapproved"));
    }

    #[tokio::test]
    async fn test_guard_skips_step() {
        let mut state = WorkflowState::new("Notify manager");
        observed(&mut state, 103, "disapproved", 80, None);
        let plan = planner(FailingLlmClient).plan("Notify manager", &state).await.unwrap();
        assert!(matches!(plan, StepPlan::Skipped { ref reason, .. } if reason.contains("manager_email")));

        let mut state = WorkflowState::new("Create reapproval ticket");
        observed(&mut state, 102, RequestStatus::InProgress.as_str(), 50, None);
        let plan = planner(FailingLlmClient)
            .plan("Create reapproval ticket", &state)
            .await
            .unwrap();
        assert!(matches!(plan, StepPlan::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_ask_user_context_key_comes_from_metadata() {
        let state = WorkflowState::new("Ask request id");
        let plan = planner(FailingLlmClient).plan("Ask request id", &state).await.unwrap();
        let StepPlan::Invoke { context_key, .. } = plan else {
            panic!("expected invocation");
        };
        assert_eq!(context_key, "request_id");
    }

    #[tokio::test]
    async fn test_oracle_fills_missing_params() {
        let llm = ScriptedLlmClient::new(vec![Ok(
            r#"{"endpoint": "/requests/104", "method": "DELETE"}"#.to_string(),
        )]);
        let state = WorkflowState::new("Check request status");
        let plan = planner(llm).plan("Check request status", &state).await.unwrap();
        let StepPlan::Invoke { invocations, .. } = plan else {
            panic!("expected invocation");
        };
        assert_eq!(invocations[0].params["endpoint"], "/requests/104");
        assert_eq!(invocations[0].params["method"], "GET");
    }

    #[tokio::test]
    async fn test_fill_failure_keeps_template() {
        let state = WorkflowState::new("Check request status");
        let plan = planner(FailingLlmClient)
            .plan("Check request status", &state)
            .await
            .unwrap();
        let StepPlan::Invoke { invocations, .. } = plan else {
            panic!("expected invocation");
        };
        assert_eq!(invocations[0].params["endpoint"], "/requests/{request_id}");
    }

    #[tokio::test]
    async fn test_oracle_tools_mode() {
        let llm = ScriptedLlmClient::new(vec![Ok(
            r#"{"tool_calls": [{"tool": "show_message_to_user", "parameters": {"message": "hi"}}, {"tool": "api_call", "parameters": {"endpoint": "/tickets"}}]}"#
                .to_string(),
        )]);
        let state = WorkflowState::new("Greet the user");
        let plan = planner(llm)
            .with_mode(StepMode::OracleTools)
            .plan("Greet the user", &state)
            .await
            .unwrap();
        let StepPlan::Invoke { action, invocations, context_key, .. } = plan else {
            panic!("expected invocation");
        };
        assert_eq!(action, "oracle:show_message_to_user,api_call");
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].target, ToolTarget::Named("api_call".to_string()));
        assert_eq!(context_key, "Greet the user");
    }

    #[tokio::test]
    async fn test_oracle_tools_falls_back_to_repository() {
        let state = WorkflowState::new("Notify manager");
        let plan = planner(FailingLlmClient)
            .with_mode(StepMode::OracleTools)
            .plan("Notify manager", &state)
            .await
            .unwrap();
        // 没有请求记录，守卫不满足
        assert!(matches!(plan, StepPlan::Skipped { ref action, .. } if action == "notify_manager"));
    }

    #[test]
    fn test_only_get_api_calls_are_idempotent() {
        let invocation = |target: ToolTarget, params: Value| ToolInvocation { target, params };
        assert!(invocation(ToolTarget::Handler(HandlerType::ApiCall), json!({"endpoint": "/requests/1"})).is_idempotent_read());
        assert!(invocation(ToolTarget::Named("api_call".into()), json!({"method": " get "})).is_idempotent_read());
        assert!(!invocation(ToolTarget::Handler(HandlerType::ApiCall), json!({"method": "POST"})).is_idempotent_read());
        assert!(!invocation(ToolTarget::Handler(HandlerType::CreateTicket), json!({})).is_idempotent_read());
        assert!(!invocation(ToolTarget::Handler(HandlerType::SendNotification), json!({})).is_idempotent_read());
        assert!(!invocation(ToolTarget::Named("ask_user_input".into()), json!({})).is_idempotent_read());
    }

    #[tokio::test]
    async fn test_reply_slot_is_extracted() {
        let p = planner(ScriptedLlmClient::new(vec![Ok(
            r#"{"input_validation": "success", "user_response": "Got it.", "slots": {"request_id": "103", "team": "finance"}}"#.to_string(),
        )]));
        let updates = p.interpret_reply("Please provide your request ID.", "my id is 103, finance team", "request_id").await;
        assert_eq!(
            updates,
            vec![
                ("team".to_string(), "finance".to_string()),
                ("request_id".to_string(), "103".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_kept_verbatim_without_usable_interpretation() {
        let raw = vec![("request_id".to_string(), "not sure".to_string())];
        let rejected = planner(ScriptedLlmClient::new(vec![Ok(
            r#"{"input_validation": "fail", "slots": {"request_id": "unknown"}}"#.to_string(),
        )]));
        assert_eq!(rejected.interpret_reply("Request ID?", "not sure", "request_id").await, raw);
        assert_eq!(planner(FailingLlmClient).interpret_reply("Request ID?", "not sure", "request_id").await, raw);

        let disabled = planner(ScriptedLlmClient::new(vec![])).with_interpret_user_replies(false);
        assert_eq!(disabled.interpret_reply("Request ID?", "not sure", "request_id").await, raw);
    }
}
