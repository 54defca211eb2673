//! 用户交互通道：AskUserInput 的提问与 ShowMessage 的消息在这里呈现
//!
//! ConsoleChannel 读写终端；SimulatedUserChannel 按关键词生成模拟回复，用于演示与测试。

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(MessageType::Info),
            "success" => Some(MessageType::Success),
            "warning" => Some(MessageType::Warning),
            "error" => Some(MessageType::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Info => "info",
            MessageType::Success => "success",
            MessageType::Warning => "warning",
            MessageType::Error => "error",
        }
    }
}

#[async_trait]
pub trait UserChannel: Send + Sync {
    /// 提问并等待回复（可能无限期阻塞，由分发器的超时兜底）
    async fn ask(&self, prompt: &str, context: Option<&str>) -> Result<String, String>;

    /// 展示消息，返回用户确认文本
    async fn show(&self, message: &str, message_type: MessageType) -> Result<String, String>;
}

/// 终端通道：stdout 输出，stdin 读取一行作为回复
pub struct ConsoleChannel {
    stdin: tokio::sync::Mutex<BufReader<Stdin>>,
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserChannel for ConsoleChannel {
    async fn ask(&self, prompt: &str, context: Option<&str>) -> Result<String, String> {
        let mut out = tokio::io::stdout();
        let mut text = format!("\n[?] {prompt}\n");
        if let Some(ctx) = context.filter(|c| !c.is_empty()) {
            text.push_str(&format!("    ({ctx})\n"));
        }
        text.push_str("> ");
        out.write_all(text.as_bytes()).await.map_err(|e| e.to_string())?;
        out.flush().await.map_err(|e| e.to_string())?;

        let mut line = String::new();
        let n = self
            .stdin
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("stdin closed".to_string());
        }
        Ok(line.trim().to_string())
    }

    async fn show(&self, message: &str, message_type: MessageType) -> Result<String, String> {
        let tag = match message_type {
            MessageType::Info => "info",
            MessageType::Success => " ok ",
            MessageType::Warning => "warn",
            MessageType::Error => "fail",
        };
        let mut out = tokio::io::stdout();
        out.write_all(format!("\n[{tag}] {message}\n").as_bytes())
            .await
            .map_err(|e| e.to_string())?;
        out.flush().await.map_err(|e| e.to_string())?;
        Ok("displayed".to_string())
    }
}

/// 模拟用户：先匹配自定义关键词回复，再按内置规则生成；记录所有交互
#[derive(Default)]
pub struct SimulatedUserChannel {
    answers: Vec<(String, String)>,
    transcript: Mutex<Vec<String>>,
}

impl SimulatedUserChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// prompt 中包含 keyword（不区分大小写）时回复 answer
    pub fn with_answer(mut self, keyword: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers.push((keyword.into().to_lowercase(), answer.into()));
        self
    }

    /// 交互记录，格式为 `ask: ...` / `show(type): ...`
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn record(&self, line: String) {
        if let Ok(mut t) = self.transcript.lock() {
            t.push(line);
        }
    }

    fn reply_for(&self, prompt: &str) -> String {
        let p = prompt.to_lowercase();
        if let Some((_, answer)) = self.answers.iter().find(|(k, _)| p.contains(k.as_str())) {
            return answer.clone();
        }
        if p.contains("request id") || p.contains("request_id") {
            "102".to_string()
        } else if p.contains("manager") {
            "manager@company.com".to_string()
        } else if p.contains("email") {
            "user@company.com".to_string()
        } else if p.contains("reason") {
            "Need access for Q4 budget analysis project".to_string()
        } else if p.contains("confirm") || p.contains("approve") {
            "Yes, I confirm".to_string()
        } else if p.contains("priority") {
            "high".to_string()
        } else {
            "Please proceed with the next step".to_string()
        }
    }

    fn acknowledgment_for(message: &str) -> &'static str {
        let m = message.to_lowercase();
        if m.contains("approved") {
            "Great! Thank you for the approval."
        } else if m.contains("ticket") && m.contains("created") {
            "Thank you for creating the ticket."
        } else if m.contains("processing") || m.contains("processed") {
            "Understood. I'll wait for the process to complete."
        } else if m.contains("error") {
            "I see there's an issue. What should I do next?"
        } else {
            "Acknowledged. Thank you for the information."
        }
    }
}

#[async_trait]
impl UserChannel for SimulatedUserChannel {
    async fn ask(&self, prompt: &str, _context: Option<&str>) -> Result<String, String> {
        self.record(format!("ask: {prompt}"));
        Ok(self.reply_for(prompt))
    }

    async fn show(&self, message: &str, message_type: MessageType) -> Result<String, String> {
        self.record(format!("show({}): {message}", message_type.as_str()));
        Ok(Self::acknowledgment_for(message).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_replies() {
        let ch = SimulatedUserChannel::new();
        assert_eq!(ch.ask("What is your request ID?", None).await.unwrap(), "102");
        assert_eq!(
            ch.ask("Anything else?", None).await.unwrap(),
            "Please proceed with the next step"
        );
        assert_eq!(ch.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_custom_answer_wins() {
        let ch = SimulatedUserChannel::new().with_answer("request id", "104");
        assert_eq!(ch.ask("Please provide your request ID.", None).await.unwrap(), "104");
    }

    #[tokio::test]
    async fn test_acknowledgment() {
        let ch = SimulatedUserChannel::new();
        let ack = ch
            .show("Drive access is already approved.", MessageType::Success)
            .await
            .unwrap();
        assert!(ack.contains("approval"));
        assert_eq!(ch.transcript(), vec!["show(success): Drive access is already approved."]);
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!(MessageType::parse("WARNING"), Some(MessageType::Warning));
        assert_eq!(MessageType::parse("loud"), None);
    }
}
