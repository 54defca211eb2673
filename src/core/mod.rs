//! 核心层：错误与恢复、Orchestrator 构建

pub mod builder;
pub mod error;
pub mod recovery;

pub use builder::OrchestratorBuilder;
pub use error::{RecoveryAction, WorkflowError, WorkflowFailure};
pub use recovery::RecoveryEngine;
