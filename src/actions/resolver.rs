//! 步骤解析：将自由文本的 SOP 步骤匹配到仓库中语义最接近的动作
//!
//! 步骤文本与每个动作名分别嵌入，按余弦相似度取严格最大者（平局取仓库中靠前者）。
//! 动作名的向量按文本缓存；嵌入 API 失败时本次解析整体改用词法嵌入，保证结果与 Oracle 无关。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::actions::{ActionEntry, ActionRepository};
use crate::core::WorkflowError;
use crate::llm::{cosine_similarity, EmbeddingProvider, KeywordEmbedder};

/// 解析结果：匹配到的动作与得分
#[derive(Debug, Clone)]
pub struct Resolution {
    pub entry: ActionEntry,
    pub score: f32,
}

pub struct StepResolver {
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: KeywordEmbedder,
    /// 低于该值视为低置信度；None 表示总是返回最佳匹配
    min_similarity: Option<f32>,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl StepResolver {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, min_similarity: Option<f32>) -> Self {
        Self {
            embedder,
            lexical: KeywordEmbedder::default(),
            min_similarity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(
        &self,
        step_text: &str,
        repository: &ActionRepository,
    ) -> Result<Resolution, WorkflowError> {
        if repository.is_empty() {
            return Err(WorkflowError::ResolutionError(
                "action repository is empty".to_string(),
            ));
        }

        let (query, candidates) = match self.embed_all(step_text, repository).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, using lexical embedder");
                let query = self.lexical.embed_text(step_text);
                let candidates = repository
                    .entries()
                    .iter()
                    .map(|a| self.lexical.embed_text(&a.name))
                    .collect();
                (query, candidates)
            }
        };

        let mut best: Option<(usize, f32)> = None;
        for (i, vector) in candidates.iter().enumerate() {
            let score = cosine_similarity(&query, vector);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((i, score)),
            }
        }
        let (idx, score) = best.ok_or_else(|| {
            WorkflowError::ResolutionError("no candidate actions".to_string())
        })?;
        let entry = repository.entries()[idx].clone();
        tracing::debug!(step = step_text, action = %entry.name, score, "step resolved");

        if let Some(min) = self.min_similarity {
            if score < min {
                return Err(WorkflowError::ResolutionError(format!(
                    "best match '{}' for step '{}' scored {:.3}, below {:.3}",
                    entry.name, step_text, score, min
                )));
            }
        }
        Ok(Resolution { entry, score })
    }

    async fn embed_all(
        &self,
        step_text: &str,
        repository: &ActionRepository,
    ) -> Result<(Vec<f32>, Vec<Vec<f32>>), String> {
        let query = self.embedder.embed(step_text).await?;
        let mut candidates = Vec::with_capacity(repository.len());
        for action in repository.entries() {
            let cached = self
                .cache
                .lock()
                .map_err(|e| e.to_string())?
                .get(&action.name)
                .cloned();
            let vector = match cached {
                Some(v) => v,
                None => {
                    let v = self.embedder.embed(&action.name).await?;
                    self.cache
                        .lock()
                        .map_err(|e| e.to_string())?
                        .insert(action.name.clone(), v.clone());
                    v
                }
            };
            if vector.len() != query.len() {
                return Err(format!(
                    "dimension mismatch for '{}': {} vs {}",
                    action.name,
                    vector.len(),
                    query.len()
                ));
            }
            candidates.push(vector);
        }
        Ok((query, candidates))
    }
}
