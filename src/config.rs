//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SOPILOT__*` 覆盖（双下划线表示嵌套，如 `SOPILOT__LLM__PROVIDER=ollama`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::actions::{drive_access_actions, ActionEntry, ActionRepository};
use crate::workflow::{StepMode, DEFAULT_MAX_ITERATIONS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub workflow: WorkflowSection,
    pub tools: ToolsSection,
    pub backend: BackendSection,
    /// 动作仓库；为空时使用内置的网盘访问目录
    pub actions: Vec<ActionEntry>,
}

impl AppConfig {
    /// 按配置构造动作仓库
    pub fn action_repository(&self) -> ActionRepository {
        if self.actions.is_empty() {
            ActionRepository::new(drive_access_actions())
        } else {
            ActionRepository::new(self.actions.clone())
        }
    }
}

/// [llm] 段：Oracle 后端、嵌入模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / ollama / mock；缺少 Key 时降级为 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时使用本地词法嵌入
    pub embedding_model: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            embedding_model: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 Oracle 调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request)
    }
}

/// [workflow] 段：迭代上限、记忆窗口、步骤模式、匹配阈值、只读调用的重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_iterations: usize,
    /// 决策提示词中包含的最近执行记忆条数
    pub memory_window: usize,
    pub step_mode: StepMode,
    /// 语义匹配的最低得分；未设置时总是取最佳匹配
    pub min_similarity: Option<f32>,
    /// 只读 ApiCall（GET）返回 success=false 时的重试次数；写操作从不重试
    pub max_tool_retries: u32,
    /// 模板参数仍含占位符时是否请 Oracle 补全
    pub fill_missing_params: bool,
    /// AskUserInput 的回复是否交给 Oracle 校验并抽取槽位
    pub interpret_user_replies: bool,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            memory_window: 3,
            step_mode: StepMode::default(),
            min_similarity: None,
            max_tool_retries: 0,
            fill_missing_params: true,
            interpret_user_replies: true,
        }
    }
}

/// [tools] 段：工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub timeout_secs: u64,
    /// AskUserInput 等待用户回复的超时（秒）
    pub user_input_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_input_timeout_secs: 600,
        }
    }
}

/// [backend] 段：协作服务地址；未设置时使用内存存储
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SOPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件不存在时报错）
/// 3. 最后叠加环境变量 SOPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SOPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::HandlerType;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.workflow.max_iterations, 25);
        assert_eq!(cfg.workflow.memory_window, 3);
        assert_eq!(cfg.workflow.step_mode, StepMode::Repository);
        assert_eq!(cfg.workflow.max_tool_retries, 0);
        assert!(cfg.workflow.min_similarity.is_none());
        assert!(cfg.workflow.interpret_user_replies);
        assert_eq!(cfg.llm.provider, "deepseek");
        assert!(cfg.action_repository().lookup("check_request_status").is_some());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[llm]
provider = "mock"

[workflow]
max_iterations = 7
step_mode = "oracle_tools"
min_similarity = 0.4
interpret_user_replies = false

[[actions]]
name = "say_hello"
handler_type = "show_message"
param_template = '{{"message": "hello"}}'

[[actions]]
name = "lookup"
handler_type = "api_call"
api_path = "/requests/{{request_id}}"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.workflow.max_iterations, 7);
        assert_eq!(cfg.workflow.memory_window, 3);
        assert_eq!(cfg.workflow.step_mode, StepMode::OracleTools);
        assert_eq!(cfg.workflow.min_similarity, Some(0.4));
        assert!(!cfg.workflow.interpret_user_replies);

        let repo = cfg.action_repository();
        assert_eq!(repo.len(), 2);
        let lookup = repo.lookup("lookup").unwrap();
        assert_eq!(lookup.handler_type, HandlerType::ApiCall);
        assert_eq!(lookup.api_path, "/requests/{request_id}");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/sopilot.toml"))).is_err());
    }
}
