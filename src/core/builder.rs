//! Orchestrator 构建器：统一的组件初始化逻辑
//!
//! 默认按 AppConfig 创建 Oracle、嵌入、协作服务与用户通道；测试与嵌入方可逐项替换。

use std::sync::Arc;

use crate::actions::{ActionRepository, StepResolver};
use crate::backend::{Backend, HttpBackend, InMemoryBackend};
use crate::config::AppConfig;
use crate::core::RecoveryEngine;
use crate::decision::DecisionPolicy;
use crate::llm::{create_embedder_from_config, create_llm_from_config, EmbeddingProvider, LlmClient};
use crate::tools::{build_handler_table, ConsoleChannel, ToolDispatcher, UserChannel};
use crate::workflow::{Orchestrator, StepPlanner};

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    backend: Option<Arc<dyn Backend>>,
    channel: Option<Arc<dyn UserChannel>>,
    repository: Option<Arc<ActionRepository>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            embedder: None,
            backend: None,
            channel: None,
            repository: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn UserChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_repository(mut self, repository: ActionRepository) -> Self {
        self.repository = Some(Arc::new(repository));
        self
    }

    /// 多个构建器共享同一个只读仓库
    pub fn with_shared_repository(mut self, repository: Arc<ActionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 配置了 backend.base_url 时访问真实服务，否则使用演示数据的内存存储
    fn build_backend(&self) -> Arc<dyn Backend> {
        match self.config.backend.base_url.as_deref() {
            Some(url) => {
                tracing::info!(url, "using HTTP collaborator backend");
                Arc::new(HttpBackend::new(url, self.config.backend.timeout_secs))
            }
            None => {
                tracing::info!("using in-memory collaborator backend");
                Arc::new(InMemoryBackend::seeded())
            }
        }
    }

    pub fn build(self) -> Orchestrator {
        let cfg = &self.config;
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&cfg.llm));
        let embedder = self
            .embedder
            .clone()
            .unwrap_or_else(|| create_embedder_from_config(&cfg.llm));
        let backend = self.backend.clone().unwrap_or_else(|| self.build_backend());
        let channel = self
            .channel
            .clone()
            .unwrap_or_else(|| Arc::new(ConsoleChannel::new()));
        let repository = self
            .repository
            .clone()
            .unwrap_or_else(|| Arc::new(cfg.action_repository()));
        let timeout = cfg.llm.request_timeout();

        let dispatcher = ToolDispatcher::new(
            build_handler_table(backend, channel),
            cfg.tools.timeout_secs,
            cfg.tools.user_input_timeout_secs,
        );
        let planner = StepPlanner::new(
            StepResolver::new(embedder, cfg.workflow.min_similarity),
            repository,
            llm.clone(),
            timeout,
        )
        .with_mode(cfg.workflow.step_mode)
        .with_fill_missing_params(cfg.workflow.fill_missing_params)
        .with_interpret_user_replies(cfg.workflow.interpret_user_replies)
        .with_memory_window(cfg.workflow.memory_window)
        .with_tool_definitions(dispatcher.table().definitions());
        let policy = DecisionPolicy::new(llm, cfg.workflow.memory_window, timeout);

        Orchestrator::new(
            policy,
            planner,
            dispatcher,
            RecoveryEngine::new(cfg.workflow.max_tool_retries),
        )
        .with_max_iterations(cfg.workflow.max_iterations)
    }
}
