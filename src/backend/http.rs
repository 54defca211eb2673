//! HTTP 协作服务客户端：GET/POST/PATCH 带超时，404 映射为 NotFound，其余非 2xx 映射为 Http

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::backend::{
    Backend, BackendError, NewNotification, NewTicket, Notification, RequestRecord,
    RequestStatus, Ticket,
};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn decode<T: DeserializeOwned>(
        resp: Response,
        what: &str,
    ) -> Result<T, BackendError> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(what.to_string())),
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                Err(BackendError::Http(format!("{s}: {body}")))
            }
            _ => resp
                .json::<T>()
                .await
                .map_err(|e| BackendError::Decode(e.to_string())),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, BackendError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Self::decode(resp, what).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_request(&self, request_id: u64) -> Result<RequestRecord, BackendError> {
        self.get(&format!("/requests/{request_id}"), &format!("request {request_id}"))
            .await
    }

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, BackendError> {
        self.get("/requests", "requests").await
    }

    async fn update_request_status(
        &self,
        request_id: u64,
        status: RequestStatus,
    ) -> Result<RequestRecord, BackendError> {
        let resp = self
            .client
            .patch(self.url(&format!("/requests/{request_id}/status")))
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Self::decode(resp, &format!("request {request_id}")).await
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, BackendError> {
        let resp = self
            .client
            .post(self.url("/tickets"))
            .json(&ticket)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Self::decode(resp, "tickets").await
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, BackendError> {
        self.get("/tickets", "tickets").await
    }

    async fn send_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BackendError> {
        let resp = self
            .client
            .post(self.url("/notifications"))
            .json(&notification)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Self::decode(resp, "notifications").await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError> {
        self.get("/notifications", "notifications").await
    }
}
