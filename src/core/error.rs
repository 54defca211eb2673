//! 工作流错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 WorkflowError 决定 FallbackToSopOrder / RecordAndContinue / RetryTool / Abort。

use thiserror::Error;

use crate::workflow::WorkflowState;

/// 工作流运行过程中可能出现的错误（解析、解析动作、分发、Oracle、迭代上限等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// Oracle 输出中无法提取合法 JSON（本地回退，不向调用方暴露）
    #[error("Decision parse error: {0}")]
    ParseError(String),

    /// 动作仓库为空（致命）或匹配置信度低于阈值（记录后继续）
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Dispatch error: {0}")]
    DispatchError(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Iteration bound exceeded: limit {0}")]
    IterationBoundExceeded(usize),

    #[error("Workflow cancelled")]
    Cancelled,
}

/// 致命失败：携带失败时刻的工作流状态，供调用方查看已执行的历史
#[derive(Error, Debug)]
#[error("workflow failed after {} iteration(s): {error}", state.iterations)]
pub struct WorkflowFailure {
    #[source]
    pub error: WorkflowError,
    pub state: Box<WorkflowState>,
}

impl WorkflowFailure {
    pub fn new(error: WorkflowError, state: WorkflowState) -> Self {
        Self {
            error,
            state: Box::new(state),
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 忽略 Oracle 结论，按 SOP 顺序选择第一个未完成步骤
    FallbackToSopOrder,
    /// 记入 execution memory 并将步骤标记完成，保证前进
    RecordAndContinue,
    /// 重新分发同一工具调用
    RetryTool,
    /// 终止当前运行
    Abort,
}
