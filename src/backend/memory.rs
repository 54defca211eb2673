//! 内存协作存储：单次运行私有（或由调用方显式共享），不是进程级单例
//!
//! 默认种子数据与演示服务一致：101 已批准（10h）、102 处理中（50h）、103 / 104 已驳回（80h / 100h）。

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::backend::{
    Backend, BackendError, NewNotification, NewTicket, Notification, NotificationStatus,
    RequestRecord, RequestStatus, Ticket, TicketStatus,
};

#[derive(Default)]
struct Store {
    requests: Vec<RequestRecord>,
    tickets: Vec<Ticket>,
    notifications: Vec<Notification>,
}

/// 内存后端：请求表 + 工单队列 + 通知日志，编号按追加顺序从 1 递增
#[derive(Default)]
pub struct InMemoryBackend {
    store: RwLock<Store>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requests(requests: Vec<RequestRecord>) -> Self {
        Self {
            store: RwLock::new(Store {
                requests,
                ..Store::default()
            }),
        }
    }

    /// 演示数据（请求创建时间相对当前时刻回推）
    pub fn seeded() -> Self {
        let now = Utc::now();
        let rec = |id: u64, status: RequestStatus, hours: i64, requester: &str| RequestRecord {
            request_id: id,
            status,
            created_at: now - Duration::hours(hours),
            requester_email: Some(requester.to_string()),
            reason: Some("Drive access".to_string()),
            manager_email: Some("manager@company.com".to_string()),
        };
        Self::with_requests(vec![
            rec(101, RequestStatus::Approved, 10, "user1@company.com"),
            rec(102, RequestStatus::InProgress, 50, "user2@company.com"),
            rec(103, RequestStatus::Disapproved, 80, "user3@company.com"),
            rec(104, RequestStatus::Disapproved, 100, "user4@company.com"),
        ])
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn get_request(&self, request_id: u64) -> Result<RequestRecord, BackendError> {
        self.store
            .read()
            .await
            .requests
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("request {request_id}")))
    }

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, BackendError> {
        Ok(self.store.read().await.requests.clone())
    }

    async fn update_request_status(
        &self,
        request_id: u64,
        status: RequestStatus,
    ) -> Result<RequestRecord, BackendError> {
        let mut store = self.store.write().await;
        let rec = store
            .requests
            .iter_mut()
            .find(|r| r.request_id == request_id)
            .ok_or_else(|| BackendError::NotFound(format!("request {request_id}")))?;
        rec.status = status;
        Ok(rec.clone())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, BackendError> {
        let mut store = self.store.write().await;
        let created = Ticket {
            ticket_id: store.tickets.len() as u64 + 1,
            request_id: ticket.request_id,
            title: ticket.title,
            reason: ticket.reason,
            priority: ticket.priority,
            status: TicketStatus::Open,
            created_at: Utc::now(),
        };
        store.tickets.push(created.clone());
        Ok(created)
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, BackendError> {
        Ok(self.store.read().await.tickets.clone())
    }

    async fn send_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BackendError> {
        let mut store = self.store.write().await;
        let sent = Notification {
            id: store.notifications.len() as u64 + 1,
            recipient: notification.recipient,
            subject: notification.subject,
            message: notification.message,
            request_id: notification.request_id,
            sent_at: Utc::now(),
            status: NotificationStatus::Sent,
        };
        store.notifications.push(sent.clone());
        Ok(sent)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError> {
        Ok(self.store.read().await.notifications.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Priority;

    #[tokio::test]
    async fn test_seeded_requests() {
        let backend = InMemoryBackend::seeded();
        let rec = backend.get_request(101).await.unwrap();
        assert_eq!(rec.status, RequestStatus::Approved);
        assert!(rec.age_hours(Utc::now()) < 72.0);
        let old = backend.get_request(104).await.unwrap();
        assert!(old.age_hours(Utc::now()) > 72.0);
        assert!(matches!(
            backend.get_request(999).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_ids_are_sequential() {
        let backend = InMemoryBackend::new();
        for expected in 1..=3u64 {
            let t = backend
                .create_ticket(NewTicket {
                    request_id: Some(103),
                    title: "Re-approval".into(),
                    reason: "Delayed".into(),
                    priority: Priority::High,
                })
                .await
                .unwrap();
            assert_eq!(t.ticket_id, expected);
            assert_eq!(t.status, TicketStatus::Open);
        }
        assert_eq!(backend.list_tickets().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_status() {
        let backend = InMemoryBackend::seeded();
        let rec = backend
            .update_request_status(102, RequestStatus::Approved)
            .await
            .unwrap();
        assert_eq!(rec.status, RequestStatus::Approved);
        assert_eq!(
            backend.get_request(102).await.unwrap().status,
            RequestStatus::Approved
        );
    }
}
