//! 动作仓库
//!
//! 启动时从配置（或内置目录）加载一次，运行期间只读；可通过 Arc 在多个并发运行间共享，无需加锁。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actions::ActionGuard;

/// 动作的处理器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    #[serde(alias = "AskUserInput")]
    AskUserInput,
    #[serde(alias = "ShowMessage", alias = "message_to_user")]
    ShowMessage,
    #[serde(alias = "ApiCall")]
    ApiCall,
    #[serde(alias = "CreateTicket")]
    CreateTicket,
    #[serde(alias = "SendNotification")]
    SendNotification,
    #[serde(alias = "ExternalKnowledge")]
    ExternalKnowledge,
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerType::AskUserInput => "ask_user_input",
            HandlerType::ShowMessage => "show_message",
            HandlerType::ApiCall => "api_call",
            HandlerType::CreateTicket => "create_ticket",
            HandlerType::SendNotification => "send_notification",
            HandlerType::ExternalKnowledge => "external_knowledge",
        };
        f.write_str(s)
    }
}

/// 仓库中的一个动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub name: String,
    pub handler_type: HandlerType,
    /// 交互元数据：AskUserInput 的第一项作为 userContext 的键
    #[serde(default)]
    pub interaction_metadata: Vec<String>,
    /// ApiCall 的路径模板，如 `/requests/{request_id}`
    #[serde(default)]
    pub api_path: String,
    /// 参数模板（JSON 对象文本，可含 `{placeholder}`）
    #[serde(default)]
    pub param_template: String,
    /// ApiCall 的 HTTP 方法，缺省 GET
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub guard: Option<ActionGuard>,
}

impl ActionEntry {
    pub fn new(name: impl Into<String>, handler_type: HandlerType) -> Self {
        Self {
            name: name.into(),
            handler_type,
            interaction_metadata: Vec::new(),
            api_path: String::new(),
            param_template: String::new(),
            method: None,
            guard: None,
        }
    }

    pub fn with_metadata(mut self, items: &[&str]) -> Self {
        self.interaction_metadata = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = path.into();
        self
    }

    pub fn with_param_template(mut self, template: impl Into<String>) -> Self {
        self.param_template = template.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_guard(mut self, guard: ActionGuard) -> Self {
        self.guard = Some(guard);
        self
    }
}

/// 动作仓库：保持配置顺序（解析时的平局按此顺序决定），按名称查找
#[derive(Debug, Clone, Default)]
pub struct ActionRepository {
    entries: Vec<ActionEntry>,
    index: HashMap<String, usize>,
}

impl ActionRepository {
    /// 同名动作保留第一个
    pub fn new(entries: Vec<ActionEntry>) -> Self {
        let mut repo = Self::default();
        for entry in entries {
            if repo.index.contains_key(&entry.name) {
                tracing::warn!(action = %entry.name, "duplicate action name ignored");
                continue;
            }
            repo.index.insert(entry.name.clone(), repo.entries.len());
            repo.entries.push(entry);
        }
        repo
    }

    pub fn lookup(&self, name: &str) -> Option<&ActionEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
