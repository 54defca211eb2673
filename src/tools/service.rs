//! CreateTicket 与 SendNotification 工具：协作服务的写操作

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{Backend, NewNotification, NewTicket, Priority};
use crate::tools::schema::{
    parse_params, schema_of, CreateTicketParams, SendNotificationParams,
};
use crate::tools::{ToolHandler, ToolKind};

pub struct CreateTicketTool {
    backend: Arc<dyn Backend>,
}

impl CreateTicketTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for CreateTicketTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CreateTicket
    }

    fn description(&self) -> &str {
        "Create a support ticket"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CreateTicketParams>()
    }

    async fn execute(&self, params: &Value) -> Result<Value, String> {
        let p: CreateTicketParams = parse_params(self.kind().name(), params)?;
        let priority = match p.priority.as_deref() {
            None => Priority::default(),
            Some(raw) => Priority::parse(raw).ok_or_else(|| format!("invalid priority: {raw}"))?,
        };
        let created = self
            .backend
            .create_ticket(NewTicket {
                request_id: p.request_id,
                title: p.title,
                reason: p.description,
                priority,
            })
            .await;
        Ok(match created {
            Ok(ticket) => json!({
                "success": true,
                "message": format!("Ticket #{} created successfully", ticket.ticket_id),
                "ticket": ticket,
            }),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        })
    }
}

pub struct SendNotificationTool {
    backend: Arc<dyn Backend>,
}

impl SendNotificationTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for SendNotificationTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SendNotification
    }

    fn description(&self) -> &str {
        "Send an email notification"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SendNotificationParams>()
    }

    async fn execute(&self, params: &Value) -> Result<Value, String> {
        let p: SendNotificationParams = parse_params(self.kind().name(), params)?;
        if p.recipient.trim().is_empty() || !p.recipient.contains('@') {
            return Err(format!("invalid recipient: '{}'", p.recipient));
        }
        let sent = self
            .backend
            .send_notification(NewNotification {
                recipient: p.recipient,
                subject: p.subject,
                message: p.message,
                request_id: p.request_id,
            })
            .await;
        Ok(match sent {
            Ok(notification) => json!({
                "success": true,
                "message": format!("Notification sent to {}", notification.recipient),
                "notification": notification,
            }),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        })
    }
}
