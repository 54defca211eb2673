//! 主循环：决策 → 规划 → 分发 → 写入执行记忆
//!
//! 每次迭代的效果（userContext、memory、completed_steps、iterations）在所有工具调用结束后一次性提交，
//! 因此取消只会丢弃进行中的那次迭代。迭代数达到上限后若策略仍给出步骤，以 IterationBoundExceeded 终止。
//!
//! 协作服务按至多一次处理：只有只读的 ApiCall 会在 success=false 时按重试预算重放。

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{RecoveryAction, RecoveryEngine, WorkflowError, WorkflowFailure};
use crate::decision::{Decision, DecisionPolicy};
use crate::llm::TokenUsage;
use crate::tools::{ToolDispatcher, ToolResult};
use crate::workflow::events::{preview, send_event};
use crate::workflow::{
    ExecutionMemoryEntry, StepPlan, StepPlanner, ToolInvocation, ToolTarget, WorkflowEvent,
    WorkflowState,
};

/// 默认迭代上限
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// 一次迭代待提交的效果
struct IterationOutcome {
    entry: ExecutionMemoryEntry,
    context_updates: Vec<(String, String)>,
}

pub struct Orchestrator {
    policy: DecisionPolicy,
    planner: StepPlanner,
    dispatcher: ToolDispatcher,
    recovery: RecoveryEngine,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(
        policy: DecisionPolicy,
        planner: StepPlanner,
        dispatcher: ToolDispatcher,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            policy,
            planner,
            dispatcher,
            recovery,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn planner(&self) -> &StepPlanner {
        &self.planner
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub async fn run(&self, sop_text: &str) -> Result<WorkflowState, WorkflowFailure> {
        self.run_with_context(sop_text, BTreeMap::new()).await
    }

    pub async fn run_with_context(
        &self,
        sop_text: &str,
        user_context: BTreeMap<String, String>,
    ) -> Result<WorkflowState, WorkflowFailure> {
        self.run_with(sop_text, user_context, CancellationToken::new(), None)
            .await
    }

    /// 完整入口：初始 userContext、取消令牌、可选事件通道
    pub async fn run_with(
        &self,
        sop_text: &str,
        user_context: BTreeMap<String, String>,
        cancel: CancellationToken,
        events: Option<&UnboundedSender<WorkflowEvent>>,
    ) -> Result<WorkflowState, WorkflowFailure> {
        let mut state = WorkflowState::with_context(sop_text, user_context);
        let run_id = state.run_id;
        let usage_at_start = self.policy.token_usage();
        tracing::info!(%run_id, steps = state.steps.len(), "workflow started");
        send_event(
            events,
            WorkflowEvent::Started {
                run_id,
                steps: state.steps.as_slice().to_vec(),
            },
        );

        if self.planner.repository().is_empty() {
            let err = WorkflowError::ResolutionError("action repository is empty".to_string());
            return Err(self.fail(err, state, usage_at_start, events));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(self.fail(WorkflowError::Cancelled, state, usage_at_start, events));
            }

            let decision = tokio::select! {
                _ = cancel.cancelled() => None,
                d = self.policy.decide(&state) => Some(d),
            };
            let Some(decision) = decision else {
                return Err(self.fail(WorkflowError::Cancelled, state, usage_at_start, events));
            };
            send_event(
                events,
                WorkflowEvent::Decision {
                    iteration: state.iterations + 1,
                    step: decision.step().map(String::from),
                    source: decision.source().clone(),
                },
            );

            let step = match decision {
                Decision::Complete { .. } => break,
                Decision::Step { step, .. } => step,
            };
            if state.iterations >= self.max_iterations {
                let err = WorkflowError::IterationBoundExceeded(self.max_iterations);
                return Err(self.fail(err, state, usage_at_start, events));
            }
            tracing::info!(%run_id, iteration = state.iterations + 1, step = %step, "executing step");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
                o = self.execute_step(&step, &state, events) => o,
            };
            let outcome = match outcome {
                Ok(o) => o,
                Err(e) => return Err(self.fail(e, state, usage_at_start, events)),
            };

            state.iterations += 1;
            state.user_context.extend(outcome.context_updates);
            let feedback = outcome.entry.feedback.clone();
            state.memory.push(outcome.entry);
            state.mark_completed(&step);
            tracing::info!(%run_id, iteration = state.iterations, step = %step, feedback = %feedback, "step recorded");
            send_event(
                events,
                WorkflowEvent::StepCompleted {
                    iteration: state.iterations,
                    step,
                    feedback,
                },
            );
        }

        state.complete = true;
        state.token_usage = self.policy.token_usage().since(&usage_at_start);
        tracing::info!(%run_id, iterations = state.iterations, total_tokens = state.token_usage.total_tokens, "workflow complete");
        send_event(
            events,
            WorkflowEvent::Finished {
                iterations: state.iterations,
                token_usage: state.token_usage,
            },
        );
        Ok(state)
    }

    fn fail(
        &self,
        error: WorkflowError,
        mut state: WorkflowState,
        usage_at_start: TokenUsage,
        events: Option<&UnboundedSender<WorkflowEvent>>,
    ) -> WorkflowFailure {
        state.token_usage = self.policy.token_usage().since(&usage_at_start);
        tracing::error!(run_id = %state.run_id, error = %error, iterations = state.iterations, "workflow aborted");
        send_event(
            events,
            WorkflowEvent::Failed {
                error: error.to_string(),
            },
        );
        WorkflowFailure::new(error, state)
    }

    /// 规划并执行一个步骤；只读访问状态，返回待提交的效果
    async fn execute_step(
        &self,
        step: &str,
        state: &WorkflowState,
        events: Option<&UnboundedSender<WorkflowEvent>>,
    ) -> Result<IterationOutcome, WorkflowError> {
        let plan = match self.planner.plan(step, state).await {
            Ok(plan) => plan,
            Err(e) => {
                self.recoverable(&e)?;
                tracing::warn!(step, error = %e, "step could not be planned");
                return Ok(IterationOutcome {
                    entry: ExecutionMemoryEntry {
                        step: step.to_string(),
                        action: step.to_string(),
                        observation: json!({ "error": e.to_string() }),
                        feedback: format!("fail: {e}"),
                    },
                    context_updates: vec![],
                });
            }
        };

        let (action, score, context_key, invocations) = match plan {
            StepPlan::Skipped { action, reason } => {
                return Ok(IterationOutcome {
                    entry: ExecutionMemoryEntry {
                        step: step.to_string(),
                        observation: json!({
                            "action": action,
                            "outcomes": [],
                            "note": format!("skipped: {reason}"),
                        }),
                        action,
                        feedback: format!("skipped: {reason}"),
                    },
                    context_updates: vec![],
                });
            }
            StepPlan::Invoke {
                action,
                score,
                context_key,
                invocations,
            } => (action, score, context_key, invocations),
        };
        if let Some(score) = score {
            send_event(
                events,
                WorkflowEvent::Resolved {
                    step: step.to_string(),
                    action: action.clone(),
                    score,
                },
            );
        }

        let mut outcomes = Vec::with_capacity(invocations.len());
        let mut failures = Vec::new();
        let mut context_updates = Vec::new();
        for invocation in invocations {
            let tool = invocation.target.name();
            send_event(
                events,
                WorkflowEvent::ToolCall {
                    tool: tool.clone(),
                    params: invocation.params.clone(),
                },
            );
            match self.dispatch_with_retry(&invocation).await {
                Ok(result) => {
                    send_event(
                        events,
                        WorkflowEvent::ToolResult {
                            tool: tool.clone(),
                            success: result.success(),
                            preview: preview(&result.0),
                        },
                    );
                    if result.success() {
                        if let Some(reply) = result.get("userResponse").and_then(Value::as_str) {
                            let question = result
                                .get("promptShown")
                                .and_then(Value::as_str)
                                .unwrap_or(step);
                            let updates = self.planner.interpret_reply(question, reply, &context_key).await;
                            context_updates.extend(updates);
                        }
                    } else {
                        let reason = result.error().unwrap_or("tool reported failure");
                        tracing::warn!(tool = %tool, reason, "tool failed");
                        failures.push(format!("{tool}: {reason}"));
                    }
                    outcomes.push(json!({
                        "tool": tool,
                        "params": invocation.params,
                        "result": result.into_value(),
                    }));
                }
                Err(e) => {
                    self.recoverable(&e)?;
                    tracing::warn!(tool = %tool, error = %e, "dispatch failed");
                    failures.push(e.to_string());
                    outcomes.push(json!({
                        "tool": tool,
                        "params": invocation.params,
                        "error": e.to_string(),
                    }));
                }
            }
        }

        let feedback = if failures.is_empty() {
            "success".to_string()
        } else {
            format!("fail: {}", failures.join("; "))
        };
        Ok(IterationOutcome {
            entry: ExecutionMemoryEntry {
                step: step.to_string(),
                observation: json!({ "action": action, "outcomes": outcomes }),
                action,
                feedback,
            },
            context_updates,
        })
    }

    /// 只读 ApiCall 的 success=false 结果按重试预算重新分发；写操作、用户交互与 DispatchError 不重试
    async fn dispatch_with_retry(&self, invocation: &ToolInvocation) -> Result<ToolResult, WorkflowError> {
        let retryable = invocation.is_idempotent_read();
        let mut attempt = 0;
        loop {
            let params = invocation.params.clone();
            let result = match &invocation.target {
                ToolTarget::Handler(handler) => self.dispatcher.execute(*handler, params).await?,
                ToolTarget::Named(name) => self.dispatcher.execute_named(name, params).await?,
            };
            if result.success() || !retryable {
                return Ok(result);
            }
            match self.recovery.on_tool_failure(attempt) {
                RecoveryAction::RetryTool => {
                    attempt += 1;
                    tracing::warn!(tool = %invocation.target.name(), attempt, "retrying tool");
                }
                _ => return Ok(result),
            }
        }
    }

    /// 非致命错误返回 Ok（调用方记录后继续）
    fn recoverable(&self, err: &WorkflowError) -> Result<(), WorkflowError> {
        match self.recovery.handle(err) {
            RecoveryAction::Abort => Err(err.clone()),
            _ => Ok(()),
        }
    }
}
