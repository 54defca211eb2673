//! 工具参数类型与 JSON Schema 生成（schemars）
//!
//! 同一组结构体既用于解析分发参数，也用于生成注入 Oracle 提示词的参数 schema。
//! 键名同时接受 snake_case 与 camelCase。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AskUserInputParams {
    /// The question/prompt to show the user
    pub prompt: String,
    /// Additional context about what input is needed
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ShowMessageParams {
    /// The message to display
    pub message: String,
    /// One of info, success, warning, error
    #[serde(default, alias = "messageType")]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ApiCallParams {
    /// API endpoint to call, e.g. /requests/101
    pub endpoint: String,
    /// One of GET, POST, PUT, DELETE
    #[serde(default)]
    pub method: Option<String>,
    /// Parameters for the API call
    #[serde(default)]
    pub params: Option<Value>,
    /// Purpose of the API call
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTicketParams {
    /// Ticket title
    pub title: String,
    /// Detailed description of the issue
    pub description: String,
    /// One of low, medium, high, urgent
    #[serde(default)]
    pub priority: Option<String>,
    /// Related request ID
    #[serde(default, alias = "requestId", deserialize_with = "lenient_u64")]
    #[schemars(with = "Option<u64>")]
    pub request_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendNotificationParams {
    /// Email address of recipient
    pub recipient: String,
    /// Email subject
    pub subject: String,
    /// Email message body
    pub message: String,
    /// Related request ID
    #[serde(default, alias = "requestId", deserialize_with = "lenient_u64")]
    #[schemars(with = "Option<u64>")]
    pub request_id: Option<u64>,
}

/// 数字或数字字符串都接受；其余（含未替换的占位符）视为缺省
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(v.as_ref().and_then(value_as_u64))
}

pub fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 将参数对象解析为具体类型；失败信息包含工具名
pub fn parse_params<T: for<'de> Deserialize<'de>>(tool: &str, params: &Value) -> Result<T, String> {
    serde_json::from_value(params.clone()).map_err(|e| format!("invalid {tool} parameters: {e}"))
}

/// 返回某参数类型的 JSON Schema
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}
