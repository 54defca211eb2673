//! 后端选择：DeepSeek / OpenAI / Ollama（均为 OpenAI 兼容格式）/ Mock
//!
//! - DeepSeek: https://api.deepseek.com，默认模型 deepseek-chat（可用 DEEPSEEK_MODEL 覆盖）
//! - Ollama: 本地 http://localhost:11434/v1，无需真实 Key

use std::sync::Arc;

use crate::config::LlmSection;
use crate::llm::{
    EmbeddingProvider, KeywordEmbedder, LlmClient, MockLlmClient, OpenAiClient, OpenAiEmbedder,
};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// 创建 DeepSeek 客户端：优先使用环境变量 `DEEPSEEK_API_KEY`
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key.as_str()))
}

/// 创建 Ollama 客户端（OpenAI 兼容端点）
pub fn create_ollama_client(base_url: Option<&str>, model: &str) -> OpenAiClient {
    OpenAiClient::new(Some(base_url.unwrap_or(OLLAMA_BASE_URL)), model, Some("ollama"))
}

/// 根据 [llm] 段与环境变量选择 Oracle 后端；缺少 Key 时降级为 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.to_lowercase().as_str() {
        "ollama" => {
            tracing::info!("Using Ollama LLM ({})", cfg.model);
            Arc::new(create_ollama_client(cfg.base_url.as_deref(), &cfg.model))
        }
        "deepseek" if has_key("DEEPSEEK_API_KEY") || has_key("OPENAI_API_KEY") => {
            tracing::info!("Using DeepSeek LLM ({})", cfg.model);
            Arc::new(create_deepseek_client(Some(&cfg.model)))
        }
        "openai" if has_key("OPENAI_API_KEY") => {
            tracing::info!("Using OpenAI LLM ({})", cfg.model);
            Arc::new(OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, None))
        }
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!(provider = other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 创建嵌入提供方：配置了 embedding_model 且有可用端点时走 API，否则用本地词法嵌入
pub fn create_embedder_from_config(cfg: &LlmSection) -> Arc<dyn EmbeddingProvider> {
    let Some(model) = cfg.embedding_model.as_deref() else {
        tracing::debug!("embedding_model not set, using keyword embedder");
        return Arc::new(KeywordEmbedder::default());
    };
    match cfg.provider.to_lowercase().as_str() {
        "ollama" => Arc::new(OpenAiEmbedder::new(
            Some(cfg.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL)),
            model,
            Some("ollama"),
        )),
        _ if has_key("OPENAI_API_KEY") => {
            Arc::new(OpenAiEmbedder::new(cfg.base_url.as_deref(), model, None))
        }
        _ => {
            tracing::debug!("embedding skipped: no OPENAI_API_KEY");
            Arc::new(KeywordEmbedder::default())
        }
    }
}

fn has_key(var: &str) -> bool {
    std::env::var(var)
        .map(|v| !v.is_empty() && v != "sk-placeholder")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_is_selected_explicitly() {
        let cfg = LlmSection {
            provider: "mock".to_string(),
            ..LlmSection::default()
        };
        let llm = create_llm_from_config(&cfg);
        let out = llm
            .complete(&[crate::llm::Message::user("hello")])
            .await
            .unwrap();
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_embedder_when_no_model() {
        let cfg = LlmSection {
            embedding_model: None,
            ..LlmSection::default()
        };
        let embedder = create_embedder_from_config(&cfg);
        let v = embedder.embed("check request status").await.unwrap();
        assert!(!v.is_empty());
    }
}
