//! 工具处理器表
//!
//! 五种处理器是封闭枚举 ToolKind，每种一个 ToolHandler 实现，由 HandlerTable 按 kind 查表分发；
//! ToolDispatcher 在调用时加超时并统一输出审计日志。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::actions::HandlerType;
use crate::core::WorkflowError;

/// 可分发的工具种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    AskUserInput,
    ShowMessage,
    ApiCall,
    CreateTicket,
    SendNotification,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::AskUserInput,
        ToolKind::ShowMessage,
        ToolKind::ApiCall,
        ToolKind::CreateTicket,
        ToolKind::SendNotification,
    ];

    /// 工具名（用于 Oracle 提议的 `{"tool": "..."}`）
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::AskUserInput => "ask_user_input",
            ToolKind::ShowMessage => "show_message_to_user",
            ToolKind::ApiCall => "api_call",
            ToolKind::CreateTicket => "create_ticket",
            ToolKind::SendNotification => "send_notification",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ask_user_input" | "askuserinput" => Some(ToolKind::AskUserInput),
            "show_message_to_user" | "show_message" | "showmessage" => Some(ToolKind::ShowMessage),
            "api_call" | "apicall" => Some(ToolKind::ApiCall),
            "create_ticket" | "createticket" => Some(ToolKind::CreateTicket),
            "send_notification" | "sendnotification" => Some(ToolKind::SendNotification),
            _ => None,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<HandlerType> for ToolKind {
    type Error = WorkflowError;

    fn try_from(handler: HandlerType) -> Result<Self, Self::Error> {
        match handler {
            HandlerType::AskUserInput => Ok(ToolKind::AskUserInput),
            HandlerType::ShowMessage => Ok(ToolKind::ShowMessage),
            HandlerType::ApiCall => Ok(ToolKind::ApiCall),
            HandlerType::CreateTicket => Ok(ToolKind::CreateTicket),
            HandlerType::SendNotification => Ok(ToolKind::SendNotification),
            other => Err(WorkflowError::DispatchError(format!("unknown tool: {other}"))),
        }
    }
}

/// 工具结果：至少包含 `success` 字段的 JSON 对象
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolResult(pub Value);

impl ToolResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self(serde_json::json!({ "success": false, "error": error.into() }))
    }

    pub fn success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// 工具处理器 trait：种类、描述（供 LLM 理解）、参数 schema、异步执行
///
/// 参数缺失或取值非法返回 Err，由分发器转为 `{success: false, error}`。
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, params: &Value) -> Result<Value, String>;
}

/// 处理器查找表
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<ToolKind, Arc<dyn ToolHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl ToolHandler + 'static) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// 已注册的种类，按 ToolKind::ALL 顺序
    pub fn kinds(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }

    /// 生成 Oracle 提示词中使用的函数定义（OpenAI tools 格式）
    pub fn definitions(&self) -> Value {
        let defs: Vec<Value> = self
            .kinds()
            .into_iter()
            .filter_map(|k| self.handlers.get(&k))
            .map(|h| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": h.kind().name(),
                        "description": h.description(),
                        "parameters": h.parameters_schema()
                    }
                })
            })
            .collect();
        Value::Array(defs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ToolHandler for Noop {
        fn kind(&self) -> ToolKind {
            ToolKind::ShowMessage
        }

        fn description(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _params: &Value) -> Result<Value, String> {
            Ok(serde_json::json!({ "success": true }))
        }
    }

    #[test]
    fn test_tool_kind_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::parse("show_message"), Some(ToolKind::ShowMessage));
        assert_eq!(ToolKind::parse("search_web"), None);
    }

    #[test]
    fn test_external_knowledge_has_no_tool() {
        let err = ToolKind::try_from(HandlerType::ExternalKnowledge).unwrap_err();
        assert!(matches!(err, WorkflowError::DispatchError(m) if m.contains("unknown tool")));
    }

    #[test]
    fn test_table_definitions() {
        let mut table = HandlerTable::new();
        table.register(Noop);
        assert_eq!(table.kinds(), vec![ToolKind::ShowMessage]);
        let defs = table.definitions();
        assert_eq!(defs[0]["function"]["name"], "show_message_to_user");
        assert!(table.get(ToolKind::ApiCall).is_none());
    }

    #[test]
    fn test_tool_result_accessors() {
        let r = ToolResult::failure("boom");
        assert!(!r.success());
        assert_eq!(r.error(), Some("boom"));
        assert!(ToolResult(serde_json::json!({"success": true})).success());
    }
}
