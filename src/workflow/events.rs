//! 运行过程事件：供 CLI / 调用方实时展示决策、工具调用与结果

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::decision::DecisionSource;
use crate::llm::TokenUsage;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        run_id: Uuid,
        steps: Vec<String>,
    },
    /// 决策结果（step 为 None 表示流程结束）
    Decision {
        iteration: usize,
        step: Option<String>,
        source: DecisionSource,
    },
    /// 步骤解析到动作
    Resolved {
        step: String,
        action: String,
        score: f32,
    },
    ToolCall {
        tool: String,
        params: Value,
    },
    /// 工具结果预览
    ToolResult {
        tool: String,
        success: bool,
        preview: String,
    },
    /// 一次迭代写入执行记忆
    StepCompleted {
        iteration: usize,
        step: String,
        feedback: String,
    },
    Finished {
        iterations: usize,
        token_usage: TokenUsage,
    },
    Failed {
        error: String,
    },
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<WorkflowEvent>>, event: WorkflowEvent) {
    if let Some(t) = tx {
        let _ = t.send(event);
    }
}

/// 结果 JSON 的截断预览
pub(crate) fn preview(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > 160 {
        format!("{}...", s.chars().take(160).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let ev = WorkflowEvent::Decision {
            iteration: 2,
            step: Some("Check status".to_string()),
            source: DecisionSource::Fallback {
                reason: "parse".to_string(),
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "decision");
        assert_eq!(v["source"]["kind"], "fallback");
    }

    #[tokio::test]
    async fn test_send_without_receiver_is_noop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let finished = || WorkflowEvent::Finished {
            iterations: 0,
            token_usage: TokenUsage::default(),
        };
        send_event(Some(&tx), finished());
        send_event(None, finished());
    }
}
