//! ApiCall 工具：把 `{endpoint, method, params}` 路由到协作服务
//!
//! 支持的端点：
//! - `GET /requests`、`GET /requests/{id}`、`PATCH|PUT /requests/{id}/status`
//! - `GET|POST /tickets`
//! - `GET|POST /notifications`
//!
//! 服务端错误、不支持的方法与未知端点都以 `{success: false, error}` 作为观察结果返回，不中断工作流。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{Backend, BackendError, NewNotification, NewTicket, Priority, RequestStatus};
use crate::tools::schema::{parse_params, schema_of, value_as_u64, ApiCallParams};
use crate::tools::{ToolHandler, ToolKind};

const SUPPORTED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

pub struct ApiCallTool {
    backend: Arc<dyn Backend>,
}

impl ApiCallTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    async fn route(&self, method: &str, segments: &[&str], params: &Value) -> Result<Value, BackendError> {
        match (method, segments) {
            ("GET", ["requests"]) => {
                let requests = self.backend.list_requests().await?;
                Ok(json!({ "success": true, "requests": requests }))
            }
            ("GET", ["requests", id]) => {
                let request = self.backend.get_request(parse_id(id)?).await?;
                Ok(json!({ "success": true, "request": request }))
            }
            ("PATCH" | "PUT", ["requests", id, "status"]) => {
                let raw = params
                    .get("status")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BackendError::Invalid("missing status".to_string()))?;
                let status = RequestStatus::parse(raw)
                    .ok_or_else(|| BackendError::Invalid(format!("unknown status: {raw}")))?;
                let request = self.backend.update_request_status(parse_id(id)?, status).await?;
                Ok(json!({ "success": true, "request": request }))
            }
            ("GET", ["tickets"]) => {
                let tickets = self.backend.list_tickets().await?;
                Ok(json!({ "success": true, "tickets": tickets }))
            }
            ("POST", ["tickets"]) => {
                let ticket = self.backend.create_ticket(new_ticket(params)?).await?;
                Ok(json!({ "success": true, "ticket": ticket }))
            }
            ("GET", ["notifications"]) => {
                let notifications = self.backend.list_notifications().await?;
                Ok(json!({ "success": true, "notifications": notifications }))
            }
            ("POST", ["notifications"]) => {
                let notification = self.backend.send_notification(new_notification(params)?).await?;
                Ok(json!({ "success": true, "notification": notification }))
            }
            _ => Err(BackendError::NotFound("endpoint".to_string())),
        }
    }
}

fn parse_id(raw: &str) -> Result<u64, BackendError> {
    raw.trim()
        .parse()
        .map_err(|_| BackendError::Invalid(format!("invalid request id: {raw}")))
}

fn str_param<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| params.get(*k).and_then(Value::as_str))
}

fn request_id_param(params: &Value) -> Option<u64> {
    params
        .get("request_id")
        .or_else(|| params.get("requestId"))
        .and_then(value_as_u64)
}

fn new_ticket(params: &Value) -> Result<NewTicket, BackendError> {
    let title = str_param(params, &["title"]).unwrap_or("Access request follow-up");
    let reason = str_param(params, &["reason", "description"])
        .ok_or_else(|| BackendError::Invalid("missing reason".to_string()))?;
    let priority = str_param(params, &["priority"])
        .and_then(Priority::parse)
        .unwrap_or_default();
    Ok(NewTicket {
        request_id: request_id_param(params),
        title: title.to_string(),
        reason: reason.to_string(),
        priority,
    })
}

fn new_notification(params: &Value) -> Result<NewNotification, BackendError> {
    let field = |key: &str| {
        str_param(params, &[key])
            .map(str::to_string)
            .ok_or_else(|| BackendError::Invalid(format!("missing {key}")))
    };
    Ok(NewNotification {
        recipient: field("recipient")?,
        subject: field("subject")?,
        message: field("message")?,
        request_id: request_id_param(params),
    })
}

/// 已知的资源路径（不论方法）
fn is_known_path(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["requests"] | ["requests", _] | ["requests", _, "status"] | ["tickets"] | ["notifications"]
    )
}

/// 端点路径切分：去掉查询串与首尾斜杠
fn split_endpoint(endpoint: &str) -> Vec<&str> {
    let path = endpoint.split('?').next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[async_trait]
impl ToolHandler for ApiCallTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ApiCall
    }

    fn description(&self) -> &str {
        "Make an API call to the collaboration service (requests, tickets, notifications)"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ApiCallParams>()
    }

    async fn execute(&self, params: &Value) -> Result<Value, String> {
        let p: ApiCallParams = parse_params(self.kind().name(), params)?;
        let method = p
            .method
            .as_deref()
            .unwrap_or("GET")
            .trim()
            .to_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Ok(json!({
                "success": false,
                "error": format!("Unsupported HTTP method: {method}"),
                "endpoint": p.endpoint,
            }));
        }
        let body = p.params.unwrap_or(Value::Null);
        let segments = split_endpoint(&p.endpoint);
        tracing::debug!(endpoint = %p.endpoint, %method, purpose = ?p.purpose, "api call");

        match self.route(&method, &segments, &body).await {
            Ok(v) => Ok(v),
            Err(BackendError::NotFound(what)) if what == "endpoint" && is_known_path(&segments) => {
                Ok(json!({
                    "success": false,
                    "error": format!("Method {method} not allowed for {}", p.endpoint),
                    "endpoint": p.endpoint,
                }))
            }
            Err(BackendError::NotFound(what)) if what == "endpoint" => Ok(json!({
                "success": false,
                "error": "Unknown API endpoint",
                "endpoint": p.endpoint,
            })),
            Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
        }
    }
}
