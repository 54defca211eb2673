//! 协作服务（请求 / 工单 / 通知）客户端契约
//!
//! 工作流核心只依赖 Backend trait；HttpBackend 访问真实服务，InMemoryBackend 为单次运行私有的内存存储。

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

/// 协作服务错误；工具层会将其转为 `{success: false, error}` 观察结果
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

/// 访问请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Approved,
    InProgress,
    Disapproved,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Approved => "approved",
            RequestStatus::InProgress => "in-progress",
            RequestStatus::Disapproved => "disapproved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approved" => Some(RequestStatus::Approved),
            "in-progress" | "in_progress" | "inprogress" => Some(RequestStatus::InProgress),
            "disapproved" => Some(RequestStatus::Disapproved),
            _ => None,
        }
    }
}

/// 工单优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// 访问请求记录（GET /requests/{id}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub request_id: u64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_email: Option<String>,
}

impl RequestRecord {
    /// 请求已存在的小时数
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 3600.0
    }

    /// 模板与守卫使用的扁平字段（snake_case 键）
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "request_id" => Some(self.request_id.to_string()),
            "status" => Some(self.status.as_str().to_string()),
            "created_at" => Some(self.created_at.to_rfc3339()),
            "requester_email" => self.requester_email.clone(),
            "reason" => self.reason.clone(),
            "manager_email" => self.manager_email.clone(),
            "age_hours" => Some(format!("{:.0}", self.age_hours(Utc::now()))),
            _ => None,
        }
    }
}

/// 工单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
}

/// 工单记录（POST /tickets 的返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub ticket_id: u64,
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub title: String,
    pub reason: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

/// 创建工单的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub title: String,
    pub reason: String,
    pub priority: Priority,
}

/// 通知状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
}

/// 通知记录（POST /notifications 的返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub request_id: Option<u64>,
    pub sent_at: DateTime<Utc>,
    pub status: NotificationStatus,
}

/// 发送通知的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub recipient: String,
    pub subject: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

/// 协作服务契约。每次调用视为至多一次、非事务性的网络请求。
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_request(&self, request_id: u64) -> Result<RequestRecord, BackendError>;

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, BackendError>;

    async fn update_request_status(
        &self,
        request_id: u64,
        status: RequestStatus,
    ) -> Result<RequestRecord, BackendError>;

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, BackendError>;

    async fn list_tickets(&self) -> Result<Vec<Ticket>, BackendError>;

    async fn send_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BackendError>;

    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_record_wire_format() {
        let json = serde_json::json!({
            "requestId": 103,
            "status": "in-progress",
            "createdAt": "2026-01-01T00:00:00Z",
            "managerEmail": "boss@company.com"
        });
        let rec: RequestRecord = serde_json::from_value(json).unwrap();
        assert_eq!(rec.request_id, 103);
        assert_eq!(rec.status, RequestStatus::InProgress);
        assert_eq!(rec.field("manager_email").as_deref(), Some("boss@company.com"));
        assert_eq!(rec.field("requester_email"), None);
    }

    #[test]
    fn test_status_and_priority_parse() {
        assert_eq!(RequestStatus::parse("In_Progress"), Some(RequestStatus::InProgress));
        assert_eq!(RequestStatus::parse("pending"), None);
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
