//! Mock / 脚本化 LLM 客户端（用于测试与离线运行，无需 API）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：回显最后一条 User 消息的开头，输出永远不是 JSON，决策会走确定性回退
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = last_user_content(messages).unwrap_or("(no input)");
        let head: String = last_user.chars().take(80).collect();
        Ok(format!("Echo from Mock: {}", head.replace(['{', '}'], "")))
    }
}

/// 永远失败的客户端（模拟网络不可用 / 超时）
#[derive(Debug, Default)]
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Err("connection refused".to_string())
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// 脚本化客户端：按顺序返回预设回复（用尽后返回错误），或由闭包按 prompt 生成回复；
/// 所有收到的 prompt 都会被记录，供断言使用
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder(
        responder: impl Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let prompt = last_user_content(messages).unwrap_or_default().to_string();
        if let Ok(mut seen) = self.prompts.lock() {
            seen.push(prompt.clone());
        }
        if let Some(responder) = &self.responder {
            return responder(&prompt);
        }
        self.replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

fn last_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_never_returns_json() {
        let out = MockLlmClient
            .complete(&[Message::user(r#"{"next_step": "x"}"#)])
            .await
            .unwrap();
        assert!(!out.contains('{'));
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order_then_exhausts() {
        let llm = ScriptedLlmClient::new(vec![Ok("a".into()), Err("boom".into())]);
        assert_eq!(llm.complete(&[Message::user("p1")]).await, Ok("a".into()));
        assert_eq!(llm.complete(&[Message::user("p2")]).await, Err("boom".into()));
        assert!(llm.complete(&[Message::user("p3")]).await.is_err());
        assert_eq!(llm.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_responder_sees_prompt() {
        let llm = ScriptedLlmClient::with_responder(|p| Ok(p.to_uppercase()));
        assert_eq!(llm.complete(&[Message::user("hi")]).await, Ok("HI".into()));
    }
}
