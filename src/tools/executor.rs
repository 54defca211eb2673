//! 工具分发器
//!
//! 持有 HandlerTable 与超时，execute(handler, params) 在超时内调用对应处理器；
//! 处理器返回 Err 或超时都转为 `{success: false, error}` 观察结果，只有没有处理器的种类才返回 DispatchError。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::actions::HandlerType;
use crate::backend::Backend;
use crate::core::WorkflowError;
use crate::tools::{
    ApiCallTool, AskUserInputTool, CreateTicketTool, HandlerTable, SendNotificationTool,
    ShowMessageTool, ToolKind, ToolResult, UserChannel,
};

/// 注册全部五种处理器
pub fn build_handler_table(backend: Arc<dyn Backend>, channel: Arc<dyn UserChannel>) -> HandlerTable {
    let mut table = HandlerTable::new();
    table.register(AskUserInputTool::new(channel.clone()));
    table.register(ShowMessageTool::new(channel));
    table.register(ApiCallTool::new(backend.clone()));
    table.register(CreateTicketTool::new(backend.clone()));
    table.register(SendNotificationTool::new(backend));
    table
}

pub struct ToolDispatcher {
    table: HandlerTable,
    timeout: Duration,
    /// AskUserInput 等待人工回复，单独设置（通常更长）
    user_input_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(table: HandlerTable, timeout_secs: u64, user_input_timeout_secs: u64) -> Self {
        Self {
            table,
            timeout: Duration::from_secs(timeout_secs),
            user_input_timeout: Duration::from_secs(user_input_timeout_secs),
        }
    }

    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    /// 按动作的处理器类型分发
    pub async fn execute(&self, handler: HandlerType, params: Value) -> Result<ToolResult, WorkflowError> {
        let kind = ToolKind::try_from(handler)?;
        self.execute_kind(kind, params).await
    }

    /// 按工具名分发（Oracle 提议的工具调用）
    pub async fn execute_named(&self, tool_name: &str, params: Value) -> Result<ToolResult, WorkflowError> {
        let kind = ToolKind::parse(tool_name)
            .ok_or_else(|| WorkflowError::DispatchError(format!("unknown tool: {tool_name}")))?;
        self.execute_kind(kind, params).await
    }

    pub async fn execute_kind(&self, kind: ToolKind, params: Value) -> Result<ToolResult, WorkflowError> {
        let handler = self
            .table
            .get(kind)
            .ok_or_else(|| WorkflowError::DispatchError(format!("unknown tool: {kind}")))?;
        let limit = match kind {
            ToolKind::AskUserInput => self.user_input_timeout,
            _ => self.timeout,
        };

        let start = Instant::now();
        let preview = params_preview(&params);
        let result = timeout(limit, handler.execute(&params)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(v)) if v.get("success").and_then(Value::as_bool).unwrap_or(false) => (true, "ok"),
            Ok(Ok(_)) => (false, "failed"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": kind.name(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        Ok(match result {
            Ok(Ok(v)) => ToolResult(v),
            Ok(Err(e)) => ToolResult::failure(e),
            Err(_) => ToolResult::failure(format!("timeout after {}s", limit.as_secs())),
        })
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
