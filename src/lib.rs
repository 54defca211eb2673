//! Sopilot - SOP 工作流自动化
//!
//! 把自由文本的标准作业流程（SOP）逐步交给决策循环执行：每一轮由 Oracle（LLM）选择下一步，
//! 失败时按 SOP 顺序回退；选中的步骤经语义匹配落到动作仓库中的动作，再由五种工具处理器执行。
//!
//! 模块划分：
//! - **actions**: 动作仓库、内置目录、守卫、步骤→动作语义解析
//! - **backend**: 协作服务（请求 / 工单 / 通知）契约与 HTTP / 内存实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、Orchestrator 构建器
//! - **decision**: 决策提示词、Oracle 输出解析、下一步选择策略
//! - **llm**: LLM 与嵌入客户端（OpenAI 兼容 / DeepSeek / Ollama / Mock）
//! - **observability**: tracing 日志初始化
//! - **tools**: 工具处理器、用户交互通道、分发器
//! - **workflow**: 工作流状态、执行记忆、步骤规划、主循环

pub mod actions;
pub mod backend;
pub mod config;
pub mod core;
pub mod decision;
pub mod llm;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use crate::core::{OrchestratorBuilder, WorkflowError, WorkflowFailure};
pub use crate::workflow::{Orchestrator, WorkflowEvent, WorkflowState};
