//! 错误恢复引擎
//!
//! 根据 WorkflowError 类型返回 RecoveryAction，供决策策略与主循环决定是回退、记录继续、重试还是终止。

use crate::core::{RecoveryAction, WorkflowError};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine {
    /// 单个工具调用失败（success=false）后的最大重试次数；0 表示不重试
    max_tool_retries: u32,
}

impl RecoveryEngine {
    pub fn new(max_tool_retries: u32) -> Self {
        Self { max_tool_retries }
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &WorkflowError) -> RecoveryAction {
        match err {
            WorkflowError::ParseError(_) | WorkflowError::OracleUnavailable(_) => {
                RecoveryAction::FallbackToSopOrder
            }
            WorkflowError::DispatchError(_) => RecoveryAction::RecordAndContinue,
            // 空仓库在运行开始前已拦截；运行中出现的只可能是低置信度匹配
            WorkflowError::ResolutionError(_) => RecoveryAction::RecordAndContinue,
            WorkflowError::IterationBoundExceeded(_) | WorkflowError::Cancelled => {
                RecoveryAction::Abort
            }
        }
    }

    /// 工具返回 success=false 时：attempt 从 0 计数，未超出预算则重试
    pub fn on_tool_failure(&self, attempt: u32) -> RecoveryAction {
        if attempt < self.max_tool_retries {
            RecoveryAction::RetryTool
        } else {
            RecoveryAction::RecordAndContinue
        }
    }
}
