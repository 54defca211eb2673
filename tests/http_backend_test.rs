//! HttpBackend 对接本地桩服务：状态码与响应体到 BackendError / 工具观察结果的映射

use std::sync::Arc;

use serde_json::json;
use sopilot::backend::{Backend, BackendError, HttpBackend, RequestStatus};
use sopilot::tools::{ApiCallTool, ToolHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const REQUEST_101: &str = r#"{"requestId": 101, "status": "approved", "createdAt": "2026-01-01T00:00:00Z", "managerEmail": "manager@company.com"}"#;

/// 按路径返回固定响应；每个连接只处理一个请求
async fn stub_service() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(respond(stream));
        }
    });
    format!("http://{addr}")
}

async fn respond(mut stream: TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head);
    let path = head.split_whitespace().nth(1).unwrap_or("/");

    let (status, body) = match path {
        "/requests/101" => ("200 OK", REQUEST_101.to_string()),
        "/requests/500" => ("200 OK", "<html>gateway error page</html>".to_string()),
        "/tickets" => ("503 Service Unavailable", "maintenance".to_string()),
        _ => ("404 Not Found", r#"{"detail": "not found"}"#.to_string()),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[tokio::test]
async fn test_request_is_decoded() {
    let backend = HttpBackend::new(&stub_service().await, 5);
    let request = backend.get_request(101).await.unwrap();
    assert_eq!(request.request_id, 101);
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.manager_email.as_deref(), Some("manager@company.com"));
}

#[tokio::test]
async fn test_unknown_request_is_not_found() {
    let backend = HttpBackend::new(&stub_service().await, 5);
    let err = backend.get_request(999).await.unwrap_err();
    assert_eq!(err, BackendError::NotFound("request 999".to_string()));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let backend = HttpBackend::new(&stub_service().await, 5);
    let err = backend.get_request(500).await.unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let backend = HttpBackend::new(&stub_service().await, 5);
    let err = backend.list_tickets().await.unwrap_err();
    match err {
        BackendError::Http(msg) => {
            assert!(msg.contains("503"), "{msg}");
            assert!(msg.contains("maintenance"), "{msg}");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_call_turns_http_failures_into_observations() {
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&stub_service().await, 5));
    let tool = ApiCallTool::new(backend);

    let out = tool
        .execute(&json!({"endpoint": "/requests/999", "method": "GET"}))
        .await
        .unwrap();
    assert_eq!(out["success"], false);
    assert_eq!(out["error"], "request 999 not found");

    let out = tool
        .execute(&json!({"endpoint": "/requests/500"}))
        .await
        .unwrap();
    assert_eq!(out["success"], false);
    assert!(out["error"].as_str().unwrap().starts_with("Decode error"));

    let out = tool
        .execute(&json!({"endpoint": "/requests/101"}))
        .await
        .unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(out["request"]["status"], "approved");
}
