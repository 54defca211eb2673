//! LLM 层：Oracle 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Ollama / Mock）与嵌入

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use embedding::{cosine_similarity, EmbeddingProvider, KeywordEmbedder, OpenAiEmbedder};
pub use mock::{FailingLlmClient, MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use provider::{
    create_deepseek_client, create_embedder_from_config, create_llm_from_config,
    create_ollama_client, DEEPSEEK_CHAT,
};
pub use traits::{generate, LlmClient, Message, Role, TokenUsage, ORACLE_SYSTEM_PROMPT};
