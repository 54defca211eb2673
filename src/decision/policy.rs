//! 决策策略：Selecting → {Dispatching, Complete}
//!
//! 1. 所有步骤已完成 → Complete
//! 2. 执行记忆为空 → steps[0]，不调用 Oracle
//! 3. 否则询问 Oracle；解析失败、哨兵值、非 SOP 步骤、已完成步骤、Oracle 异常
//!    都回退为 SOP 顺序中第一个未完成的步骤（没有则 Complete）
//!
//! 回退保证每次成功迭代后未完成步骤严格减少，因此运行必然终止。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::WorkflowError;
use crate::decision::{decision_prompt, parse_decision, DecisionResult};
use crate::llm::{generate, LlmClient, TokenUsage};
use crate::workflow::WorkflowState;

/// 决策来源
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    /// 执行记忆为空，直接取第一步
    FirstStep,
    /// 采纳 Oracle 的选择
    Oracle { reasoning: String },
    /// 回退到 SOP 顺序
    Fallback { reason: String },
    /// 所有步骤均已完成
    AllCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Step { step: String, source: DecisionSource },
    Complete { source: DecisionSource },
}

impl Decision {
    pub fn step(&self) -> Option<&str> {
        match self {
            Decision::Step { step, .. } => Some(step),
            Decision::Complete { .. } => None,
        }
    }

    pub fn source(&self) -> &DecisionSource {
        match self {
            Decision::Step { source, .. } | Decision::Complete { source } => source,
        }
    }
}

pub struct DecisionPolicy {
    llm: Arc<dyn LlmClient>,
    memory_window: usize,
    oracle_timeout: Duration,
}

impl DecisionPolicy {
    pub fn new(llm: Arc<dyn LlmClient>, memory_window: usize, oracle_timeout: Duration) -> Self {
        Self {
            llm,
            memory_window,
            oracle_timeout,
        }
    }

    /// Oracle 客户端的累计用量（与规划共用同一客户端）
    pub fn token_usage(&self) -> TokenUsage {
        self.llm.token_usage()
    }

    pub async fn decide(&self, state: &WorkflowState) -> Decision {
        if state.pending_count() == 0 {
            return Decision::Complete {
                source: DecisionSource::AllCompleted,
            };
        }
        if state.memory.is_empty() {
            if let Some(first) = state.steps.as_slice().first() {
                return Decision::Step {
                    step: first.clone(),
                    source: DecisionSource::FirstStep,
                };
            }
        }

        let err = match self.consult_oracle(state).await {
            Ok(decision) => match validate(&decision, state) {
                Ok(step) => {
                    tracing::info!(step = %step, "oracle chose next step");
                    return Decision::Step {
                        step,
                        source: DecisionSource::Oracle {
                            reasoning: decision.reasoning,
                        },
                    };
                }
                Err(reason) => WorkflowError::ParseError(reason),
            },
            Err(e) => e,
        };

        let reason = err.to_string();
        tracing::warn!(reason = %reason, "falling back to SOP order");
        match state.first_pending() {
            Some(step) => Decision::Step {
                step: step.to_string(),
                source: DecisionSource::Fallback { reason },
            },
            None => Decision::Complete {
                source: DecisionSource::Fallback { reason },
            },
        }
    }

    async fn consult_oracle(&self, state: &WorkflowState) -> Result<DecisionResult, WorkflowError> {
        let prompt = decision_prompt(
            state.steps.as_slice(),
            state.completed_steps.iter(),
            state.memory.recent(self.memory_window),
        );
        tracing::debug!(prompt = %prompt, "decision prompt");
        let raw = generate(self.llm.as_ref(), &prompt, self.oracle_timeout).await?;
        tracing::debug!(raw = %raw, "decision response");
        parse_decision(&raw)
    }
}

/// 校验 Oracle 的选择：必须是 SOP 中尚未完成的步骤
fn validate(decision: &DecisionResult, state: &WorkflowState) -> Result<String, String> {
    if decision.is_complete() {
        return Err("oracle reported completion with steps pending".to_string());
    }
    let chosen = decision
        .next_step()
        .ok_or_else(|| "oracle gave no next_step".to_string())?;
    let step = if state.steps.contains(chosen) {
        chosen
    } else {
        let (number, text) =
            strip_numbering(chosen).ok_or_else(|| format!("'{chosen}' is not a workflow step"))?;
        match state.steps.position(text) {
            Some(position) if position == number => text,
            Some(position) => {
                return Err(format!(
                    "'{chosen}' is numbered {number} but the step is number {position}"
                ))
            }
            None => return Err(format!("'{chosen}' is not a workflow step")),
        }
    };
    if state.completed_steps.contains(step) {
        return Err(format!("'{step}' is already completed"));
    }
    Ok(step.to_string())
}

/// `2. Notify manager` / `2) Notify manager` → `(2, "Notify manager")`
fn strip_numbering(s: &str) -> Option<(usize, &str)> {
    let rest = s.trim_start_matches(|c: char| c.is_ascii_digit());
    let number = s[..s.len() - rest.len()].parse().ok()?;
    let text = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    Some((number, text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, MockLlmClient, ScriptedLlmClient};
    use crate::workflow::ExecutionMemoryEntry;

    const SOP: &str = "Ask for request ID\nCheck status\nNotify if delayed";

    fn policy(llm: impl LlmClient + 'static) -> DecisionPolicy {
        DecisionPolicy::new(Arc::new(llm), 3, Duration::from_secs(5))
    }

    fn after_first_step() -> WorkflowState {
        let mut state = WorkflowState::new(SOP);
        state.memory.push(ExecutionMemoryEntry {
            step: "Ask for request ID".to_string(),
            action: "ask_request_id".to_string(),
            observation: serde_json::json!({}),
            feedback: "success".to_string(),
        });
        state.mark_completed("Ask for request ID");
        state
    }

    #[tokio::test]
    async fn test_first_step_skips_oracle() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let p = DecisionPolicy::new(llm.clone(), 3, Duration::from_secs(5));
        let d = p.decide(&WorkflowState::new(SOP)).await;
        assert_eq!(d.step(), Some("Ask for request ID"));
        assert_eq!(d.source(), &DecisionSource::FirstStep);
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_adopts_valid_oracle_choice() {
        let p = policy(ScriptedLlmClient::new(vec![Ok(
            r#"{"next_step": "Notify if delayed", "reasoning": "status already known"}"#.to_string(),
        )]));
        let d = p.decide(&after_first_step()).await;
        assert_eq!(d.step(), Some("Notify if delayed"));
        assert!(matches!(d.source(), DecisionSource::Oracle { .. }));
    }

    #[tokio::test]
    async fn test_numbered_choice_is_accepted() {
        let p = policy(ScriptedLlmClient::new(vec![Ok(
            r#"{"next_step": "2. Check status"}"#.to_string(),
        )]));
        assert_eq!(p.decide(&after_first_step()).await.step(), Some("Check status"));
    }

    #[tokio::test]
    async fn test_numbered_choice_must_match_position() {
        let p = policy(ScriptedLlmClient::new(vec![Ok(
            r#"{"next_step": "2. Notify if delayed"}"#.to_string(),
        )]));
        let d = p.decide(&after_first_step()).await;
        assert_eq!(d.step(), Some("Check status"));
        match d.source() {
            DecisionSource::Fallback { reason } => assert!(reason.contains("number 3"), "{reason}"),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_choices_fall_back_to_sop_order() {
        let outputs = [
            "not json",
            r#"{"next_step": "Order pizza"}"#,
            r#"{"next_step": "Ask for request ID"}"#,
            r#"{"next_step": "WORKFLOW_COMPLETE"}"#,
            r#"{"reasoning": "no step"}"#,
        ];
        for raw in outputs {
            let p = policy(ScriptedLlmClient::new(vec![Ok(raw.to_string())]));
            let d = p.decide(&after_first_step()).await;
            assert_eq!(d.step(), Some("Check status"), "{raw}");
            assert!(matches!(d.source(), DecisionSource::Fallback { .. }), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let d = policy(FailingLlmClient).decide(&after_first_step()).await;
        assert_eq!(d.step(), Some("Check status"));

        let d = policy(MockLlmClient).decide(&after_first_step()).await;
        assert_eq!(d.step(), Some("Check status"));
    }

    #[tokio::test]
    async fn test_complete_when_all_done() {
        let mut state = after_first_step();
        state.mark_completed("Check status");
        state.mark_completed("Notify if delayed");
        let d = policy(FailingLlmClient).decide(&state).await;
        assert_eq!(d, Decision::Complete { source: DecisionSource::AllCompleted });
    }

    #[tokio::test]
    async fn test_empty_sop_is_complete() {
        let d = policy(FailingLlmClient).decide(&WorkflowState::new("\n\n")).await;
        assert!(d.step().is_none());
    }

    #[test]
    fn test_strip_numbering() {
        assert_eq!(strip_numbering("12) Notify"), Some((12, "Notify")));
        assert_eq!(strip_numbering("Notify"), None);
        assert_eq!(strip_numbering("3 Notify"), None);
    }
}
