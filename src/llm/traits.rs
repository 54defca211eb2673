//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Ollama / Mock）实现 LlmClient：complete（非流式）。
//! 工作流只把返回的文本当作不可信的自由文本处理。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::WorkflowError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 累计 token 用量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// 相对较早快照的增量
    pub fn since(&self, earlier: &TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_sub(earlier.completion_tokens),
            total_tokens: self.total_tokens.saturating_sub(earlier.total_tokens),
        }
    }
}

/// 所有 Oracle 调用共用的系统提示
pub const ORACLE_SYSTEM_PROMPT: &str =
    "You are part of a workflow automation system that executes standard operating procedures. \
Follow the output format requested in each message exactly.";

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 客户端创建以来的累计用量；不统计的实现返回零
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// 单个 prompt 的生成调用：带超时，失败统一映射为 OracleUnavailable
pub async fn generate(
    llm: &dyn LlmClient,
    prompt: &str,
    timeout: Duration,
) -> Result<String, WorkflowError> {
    let messages = [Message::system(ORACLE_SYSTEM_PROMPT), Message::user(prompt)];
    match tokio::time::timeout(timeout, llm.complete(&messages)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(WorkflowError::OracleUnavailable(e)),
        Err(_) => Err(WorkflowError::OracleUnavailable(format!(
            "no response within {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Role>>);

    #[async_trait]
    impl LlmClient for Recorder {
        async fn complete(&self, messages: &[Message]) -> Result<String, String> {
            if let Ok(mut roles) = self.0.lock() {
                roles.extend(messages.iter().map(|m| m.role.clone()));
            }
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_sends_system_preamble() {
        let llm = Recorder::default();
        let out = generate(&llm, "pick a step", Duration::from_secs(1)).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(*llm.0.lock().unwrap(), vec![Role::System, Role::User]);
        assert_eq!(llm.token_usage(), TokenUsage::default());
    }

    #[test]
    fn test_usage_delta() {
        let later = TokenUsage { prompt_tokens: 30, completion_tokens: 8, total_tokens: 38 };
        let earlier = TokenUsage { prompt_tokens: 10, completion_tokens: 3, total_tokens: 13 };
        assert_eq!(later.since(&earlier), TokenUsage { prompt_tokens: 20, completion_tokens: 5, total_tokens: 25 });
        assert_eq!(earlier.since(&later), TokenUsage::default());
    }
}
