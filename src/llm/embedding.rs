//! 嵌入 API：供步骤→动作的语义匹配使用
//!
//! - OpenAiEmbedder：调用 OpenAI 兼容的 /embeddings 端点（OpenAI / Ollama）
//! - KeywordEmbedder：本地确定性词袋哈希嵌入，离线运行与 API 失败时的回退

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

/// 嵌入提供方：将文本编码为向量；失败时返回错误字符串
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .ok_or_else(|| "embedding response contained no vectors".to_string())
    }
}

/// 词袋哈希嵌入：按非字母数字字符切词、小写、FNV-1a 哈希到固定维度
///
/// `check_request_status` 与 "Check request status" 得到相同向量。
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    dims: usize,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl KeywordEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let idx = (fnv1a(token.as_bytes()) % self.dims as u64) as usize;
            v[idx] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.embed_text(text))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// 防止零向量除零
pub const COSINE_EPSILON: f32 = 1e-10;

/// 余弦相似度：dot(a,b) / (‖a‖·‖b‖ + ε)；维度不一致时按 0 处理
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + COSINE_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
    }

    #[test]
    fn test_cosine_zero_vector_is_finite() {
        let zero = vec![0.0, 0.0];
        let score = cosine_similarity(&zero, &zero);
        assert!(score.is_finite());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_keyword_embedder_ignores_case_and_separators() {
        let e = KeywordEmbedder::default();
        assert_eq!(
            e.embed_text("check_request_status"),
            e.embed_text("Check request   status")
        );
    }

    #[test]
    fn test_keyword_embedder_prefers_shared_tokens() {
        let e = KeywordEmbedder::default();
        let step = e.embed_text("Notify manager");
        let notify = e.embed_text("notify_manager");
        let ticket = e.embed_text("create_reapproval_ticket");
        assert!(cosine_similarity(&step, &notify) > cosine_similarity(&step, &ticket));
    }
}
