//! 单次运行的工作流状态
//!
//! 由 Orchestrator 独占；致命失败时整体放进 WorkflowFailure 交给调用方。

use std::collections::{BTreeMap, HashSet};

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::llm::TokenUsage;
use crate::workflow::ExecutionMemory;

/// 解析后的 SOP 步骤：逐行去空白、丢弃空行，顺序即执行顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SopSteps(Vec<String>);

impl SopSteps {
    pub fn parse(sop_text: &str) -> Self {
        Self(
            sop_text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, step: &str) -> bool {
        self.0.iter().any(|s| s == step)
    }

    /// 1-based 序号
    pub fn position(&self, step: &str) -> Option<usize> {
        self.0.iter().position(|s| s == step).map(|i| i + 1)
    }
}

/// 已完成步骤：保持插入顺序的集合
#[derive(Debug, Clone, Default)]
pub struct CompletedSteps {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl CompletedSteps {
    /// 首次插入返回 true
    pub fn insert(&mut self, step: &str) -> bool {
        if self.seen.contains(step) {
            return false;
        }
        self.seen.insert(step.to_string());
        self.order.push(step.to_string());
        true
    }

    pub fn contains(&self, step: &str) -> bool {
        self.seen.contains(step)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl Serialize for CompletedSteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.order.serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub steps: SopSteps,
    pub completed_steps: CompletedSteps,
    pub memory: ExecutionMemory,
    pub user_context: BTreeMap<String, String>,
    /// 已执行的分发迭代数
    pub iterations: usize,
    pub complete: bool,
    /// 本次运行期间 Oracle 消耗的 token
    pub token_usage: TokenUsage,
}

impl WorkflowState {
    pub fn new(sop_text: &str) -> Self {
        Self::with_context(sop_text, BTreeMap::new())
    }

    pub fn with_context(sop_text: &str, user_context: BTreeMap<String, String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            steps: SopSteps::parse(sop_text),
            completed_steps: CompletedSteps::default(),
            memory: ExecutionMemory::default(),
            user_context,
            iterations: 0,
            complete: false,
            token_usage: TokenUsage::default(),
        }
    }

    /// 标记完成；不在 steps 中或已完成时不变
    pub fn mark_completed(&mut self, step: &str) -> bool {
        self.steps.contains(step) && self.completed_steps.insert(step)
    }

    /// SOP 顺序中第一个未完成的步骤
    pub fn first_pending(&self) -> Option<&str> {
        self.steps
            .as_slice()
            .iter()
            .map(String::as_str)
            .find(|s| !self.completed_steps.contains(s))
    }

    /// 未完成的步骤行数（重复文本的步骤随首行一起完成）
    pub fn pending_count(&self) -> usize {
        self.steps
            .as_slice()
            .iter()
            .filter(|s| !self.completed_steps.contains(s))
            .count()
    }
}
