//! 执行记忆：只追加的 {action, observation, feedback} 历史
//!
//! 是迭代之间除步骤完成记录外唯一传递的状态；决策提示词取最近 N 条，动作守卫与模板取最新的请求记录。

use serde::Serialize;
use serde_json::Value;

use crate::backend::RequestRecord;

/// 一次迭代的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionMemoryEntry {
    /// 执行的 SOP 步骤
    pub step: String,
    /// 解析到的动作名（Oracle 提议模式下为工具名列表）
    pub action: String,
    /// 工具调用结果汇总（不透明 JSON）
    pub observation: Value,
    /// `success` / `fail: ...` / `skipped: ...`
    pub feedback: String,
}

impl ExecutionMemoryEntry {
    pub fn is_success(&self) -> bool {
        self.feedback == "success"
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionMemory {
    entries: Vec<ExecutionMemoryEntry>,
}

impl ExecutionMemory {
    pub fn push(&mut self, entry: ExecutionMemoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ExecutionMemoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ExecutionMemoryEntry> {
        self.entries.last()
    }

    /// 最近 n 条（按时间正序）
    pub fn recent(&self, n: usize) -> &[ExecutionMemoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// 最新一次观察到的请求记录（某个工具结果中的 `request` 对象）
    pub fn latest_request(&self) -> Option<RequestRecord> {
        self.entries.iter().rev().find_map(|e| {
            outcomes(&e.observation)
                .rev()
                .filter_map(|o| o.get("result").and_then(|r| r.get("request")))
                .find_map(|r| serde_json::from_value(r.clone()).ok())
        })
    }
}

fn outcomes(observation: &Value) -> impl DoubleEndedIterator<Item = &Value> {
    observation
        .get("outcomes")
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(step: &str, observation: Value) -> ExecutionMemoryEntry {
        ExecutionMemoryEntry {
            step: step.to_string(),
            action: "check_request_status".to_string(),
            observation,
            feedback: "success".to_string(),
        }
    }

    #[test]
    fn test_recent_window() {
        let mut memory = ExecutionMemory::default();
        for i in 0..5 {
            memory.push(entry(&format!("s{i}"), json!({})));
        }
        let recent: Vec<_> = memory.recent(3).iter().map(|e| e.step.as_str()).collect();
        assert_eq!(recent, vec!["s2", "s3", "s4"]);
        assert_eq!(memory.recent(10).len(), 5);
    }

    #[test]
    fn test_latest_request_prefers_newest() {
        let request = |id: u64, status: &str| {
            json!({"outcomes": [{"tool": "api_call", "params": {}, "result": {
                "success": true,
                "request": {"requestId": id, "status": status, "createdAt": "2026-01-01T00:00:00Z"}
            }}]})
        };
        let mut memory = ExecutionMemory::default();
        assert!(memory.latest_request().is_none());
        memory.push(entry("a", request(101, "approved")));
        memory.push(entry("b", json!({"outcomes": [{"tool": "show_message_to_user", "result": {"success": true}}]})));
        memory.push(entry("c", request(103, "disapproved")));
        memory.push(entry("d", json!({"note": "skipped"})));
        assert_eq!(memory.latest_request().unwrap().request_id, 103);
    }
}
