//! 动作层：动作仓库、内置目录、守卫、步骤→动作语义解析

pub mod catalog;
pub mod guard;
pub mod repository;
pub mod resolver;

pub use catalog::{drive_access_actions, DELAY_THRESHOLD_HOURS};
pub use guard::ActionGuard;
pub use repository::{ActionEntry, ActionRepository, HandlerType};
pub use resolver::{Resolution, StepResolver};
