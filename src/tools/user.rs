//! 用户交互工具：AskUserInput（阻塞等待回复）与 ShowMessage（仅等待确认）

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::tools::channel::{MessageType, UserChannel};
use crate::tools::schema::{parse_params, schema_of, AskUserInputParams, ShowMessageParams};
use crate::tools::{ToolHandler, ToolKind};

pub struct AskUserInputTool {
    channel: Arc<dyn UserChannel>,
}

impl AskUserInputTool {
    pub fn new(channel: Arc<dyn UserChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ToolHandler for AskUserInputTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AskUserInput
    }

    fn description(&self) -> &str {
        "Ask the user for input with a specific prompt"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<AskUserInputParams>()
    }

    async fn execute(&self, params: &Value) -> Result<Value, String> {
        let p: AskUserInputParams = parse_params(self.kind().name(), params)?;
        let reply = self.channel.ask(&p.prompt, p.context.as_deref()).await?;
        Ok(json!({
            "success": true,
            "userResponse": reply,
            "promptShown": p.prompt,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

pub struct ShowMessageTool {
    channel: Arc<dyn UserChannel>,
}

impl ShowMessageTool {
    pub fn new(channel: Arc<dyn UserChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ToolHandler for ShowMessageTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ShowMessage
    }

    fn description(&self) -> &str {
        "Display a message to the user"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ShowMessageParams>()
    }

    async fn execute(&self, params: &Value) -> Result<Value, String> {
        let p: ShowMessageParams = parse_params(self.kind().name(), params)?;
        let message_type = match p.message_type.as_deref() {
            None => MessageType::default(),
            Some(t) => MessageType::parse(t).ok_or_else(|| format!("invalid message_type: {t}"))?,
        };
        let ack = self.channel.show(&p.message, message_type).await?;
        Ok(json!({
            "success": true,
            "messageDisplayed": p.message,
            "messageType": message_type,
            "acknowledgment": ack,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
