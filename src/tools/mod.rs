//! 工具层：五种处理器、用户交互通道、分发器

pub mod api_call;
pub mod channel;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod service;
pub mod user;

pub use api_call::ApiCallTool;
pub use channel::{ConsoleChannel, MessageType, SimulatedUserChannel, UserChannel};
pub use executor::{build_handler_table, ToolDispatcher};
pub use registry::{HandlerTable, ToolHandler, ToolKind, ToolResult};
pub use service::{CreateTicketTool, SendNotificationTool};
pub use user::{AskUserInputTool, ShowMessageTool};
