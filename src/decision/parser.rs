//! Oracle 输出解析
//!
//! 原始文本不可信：先去掉 `<think>...</think>` 推理块，再取第一个括号平衡的 `{...}` 对象
//! （扫描时跳过字符串内的括号与转义），最后反序列化为具体类型。任何一步失败都返回 ParseError。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::WorkflowError;

/// Oracle 表示流程结束的哨兵值
pub const WORKFLOW_COMPLETE: &str = "WORKFLOW_COMPLETE";

/// Oracle 的下一步决策
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    #[serde(default, alias = "nextStep", alias = "next_action", alias = "nextAction")]
    pub next_step: Option<String>,
    #[serde(default, alias = "requiredTools", deserialize_with = "tool_names")]
    pub required_tools: Vec<String>,
    #[serde(default, alias = "thought")]
    pub reasoning: String,
}

impl DecisionResult {
    /// 去掉首尾空白后的下一步；空串视为缺省
    pub fn next_step(&self) -> Option<&str> {
        self.next_step
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.next_step() == Some(WORKFLOW_COMPLETE)
    }
}

/// Oracle 提议的一次工具调用
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolProposal {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default, alias = "args", alias = "params")]
    pub parameters: Value,
}

/// 用户回复的解读：是否满足提问、抽取出的槽位
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyInterpretation {
    #[serde(default, alias = "inputValidation", alias = "validation")]
    pub input_validation: String,
    #[serde(default, alias = "userResponse", alias = "acknowledgment")]
    pub user_response: Option<String>,
    #[serde(default, deserialize_with = "slot_map")]
    pub slots: Map<String, Value>,
}

impl ReplyInterpretation {
    pub fn is_valid(&self) -> bool {
        self.input_validation.trim().eq_ignore_ascii_case("success")
    }

    /// 槽位取值：先精确匹配键，再忽略大小写与分隔符匹配，只有一个槽位时直接取它
    pub fn slot_value(&self, key: &str) -> Option<(String, String)> {
        let wanted = normalize_key(key);
        let found = self
            .slots
            .get_key_value(key)
            .or_else(|| self.slots.iter().find(|(k, _)| normalize_key(k) == wanted))
            .or_else(|| {
                if self.slots.len() == 1 {
                    self.slots.iter().next()
                } else {
                    None
                }
            })?;
        scalar_text(found.1).map(|v| (found.0.clone(), v))
    }

    /// 全部可转成文本的槽位
    pub fn slot_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.slots
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|v| (k.clone(), v)))
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// slots 可以是对象，也可以是 `[{"key": ..., "value": ...}]` 列表
fn slot_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => map,
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| {
                let key = item.get("key").or_else(|| item.get("name"))?.as_str()?.to_string();
                let value = item.get("value")?.clone();
                Some((key, value))
            })
            .collect(),
        _ => Map::new(),
    })
}

#[derive(Deserialize)]
struct ToolPlan {
    #[serde(alias = "toolCalls")]
    tool_calls: Vec<ToolProposal>,
}

/// required_tools 可以是字符串，也可以是 `{"tool": ...}` / `{"name": ...}` 对象
fn tool_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Object(m) => m
                .get("tool")
                .or_else(|| m.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        })
        .collect())
}

fn think_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok())
        .as_ref()
}

/// 去掉推理块；只有闭合标签时丢弃它之前的全部内容
pub fn strip_think(text: &str) -> String {
    let stripped = match think_re() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    match stripped.rfind("</think>") {
        Some(idx) => stripped[idx + "</think>".len()..].to_string(),
        None => stripped,
    }
}

/// 第一个括号平衡的 JSON 对象切片
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(len) = balanced_len(&text[start..]) {
            return Some(&text[start..start + len]);
        }
        from = start + 1;
    }
    None
}

fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object<T: for<'de> Deserialize<'de>>(raw: &str, what: &str) -> Result<T, WorkflowError> {
    let cleaned = strip_think(raw);
    let json = extract_json_object(&cleaned)
        .ok_or_else(|| WorkflowError::ParseError(format!("no JSON object in {what}")))?;
    serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(format!("{what}: {e}")))
}

/// 解析下一步决策
pub fn parse_decision(raw: &str) -> Result<DecisionResult, WorkflowError> {
    parse_object(raw, "decision")
}

/// 解析工具调用提议；空列表视为解析失败
pub fn parse_tool_proposals(raw: &str) -> Result<Vec<ToolProposal>, WorkflowError> {
    let plan: ToolPlan = parse_object(raw, "tool proposal")?;
    if plan.tool_calls.is_empty() {
        return Err(WorkflowError::ParseError("tool proposal has no tool_calls".to_string()));
    }
    Ok(plan.tool_calls)
}

/// 解析用户回复解读
pub fn parse_reply_interpretation(raw: &str) -> Result<ReplyInterpretation, WorkflowError> {
    parse_object(raw, "reply interpretation")
}

/// 解析参数补全结果（任意 JSON 对象）
pub fn parse_param_object(raw: &str) -> Result<Map<String, Value>, WorkflowError> {
    parse_object(raw, "parameters")
}
