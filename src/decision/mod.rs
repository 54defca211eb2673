//! 决策层：Oracle 提示词、输出解析、下一步选择策略

pub mod parser;
pub mod policy;
pub mod prompt;

pub use parser::{
    extract_json_object, parse_decision, parse_param_object, parse_reply_interpretation,
    parse_tool_proposals, strip_think, DecisionResult, ReplyInterpretation, ToolProposal,
    WORKFLOW_COMPLETE,
};
pub use policy::{Decision, DecisionPolicy, DecisionSource};
pub use prompt::{action_params_prompt, decision_prompt, tool_proposal_prompt, user_reply_prompt};
