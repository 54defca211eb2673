//! SOP 工作流：状态、执行记忆、步骤规划、过程事件、主循环

pub mod events;
pub mod loop_;
pub mod memory;
pub mod planning;
pub mod state;

pub use events::WorkflowEvent;
pub use loop_::{Orchestrator, DEFAULT_MAX_ITERATIONS};
pub use memory::{ExecutionMemory, ExecutionMemoryEntry};
pub use planning::{
    build_params, has_placeholders, substitute, Facts, StepMode, StepPlan, StepPlanner,
    ToolInvocation, ToolTarget,
};
pub use state::{CompletedSteps, SopSteps, WorkflowState};
