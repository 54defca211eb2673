//! 动作守卫：按最近一次观察到的请求记录决定步骤是否执行
//!
//! 对应演示 SOP 的业务规则：已批准 → 结束；处理中/已驳回且未超过 72 小时 → 等待；超过 → 重新审批工单。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::RequestStatus;
use crate::backend::RequestRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionGuard {
    /// 请求状态必须属于该集合（空表示不限）
    #[serde(default)]
    pub statuses: Vec<RequestStatus>,
    /// 请求年龄严格大于该小时数
    #[serde(default)]
    pub min_age_hours: Option<f64>,
    /// 请求年龄不超过该小时数
    #[serde(default)]
    pub max_age_hours: Option<f64>,
    /// 请求记录中必须存在的字段（如 manager_email）
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl ActionGuard {
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.min_age_hours.is_none()
            && self.max_age_hours.is_none()
            && self.required_fields.is_empty()
    }

    /// 全部条件成立返回 Ok；否则返回不满足的原因
    pub fn evaluate(
        &self,
        request: Option<&RequestRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if self.is_empty() {
            return Ok(());
        }
        let Some(rec) = request else {
            return Err("no request record observed yet".to_string());
        };
        if !self.statuses.is_empty() && !self.statuses.contains(&rec.status) {
            return Err(format!("request status is {}", rec.status.as_str()));
        }
        let age = rec.age_hours(now);
        if let Some(min) = self.min_age_hours {
            if age <= min {
                return Err(format!("request age {age:.0}h does not exceed {min}h"));
            }
        }
        if let Some(max) = self.max_age_hours {
            if age > max {
                return Err(format!("request age {age:.0}h exceeds {max}h"));
            }
        }
        for field in &self.required_fields {
            if rec.field(field).map(|v| v.trim().is_empty()).unwrap_or(true) {
                return Err(format!("request has no {field}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: RequestStatus, hours: i64, manager: Option<&str>) -> RequestRecord {
        RequestRecord {
            request_id: 1,
            status,
            created_at: Utc::now() - Duration::hours(hours),
            requester_email: None,
            reason: None,
            manager_email: manager.map(String::from),
        }
    }

    fn delayed() -> ActionGuard {
        ActionGuard {
            statuses: vec![RequestStatus::InProgress, RequestStatus::Disapproved],
            min_age_hours: Some(72.0),
            ..ActionGuard::default()
        }
    }

    #[test]
    fn test_empty_guard_always_passes() {
        assert!(ActionGuard::default().evaluate(None, Utc::now()).is_ok());
    }

    #[test]
    fn test_guard_needs_a_record() {
        assert!(delayed().evaluate(None, Utc::now()).is_err());
    }

    #[test]
    fn test_delayed_guard() {
        let now = Utc::now();
        assert!(delayed()
            .evaluate(Some(&record(RequestStatus::Disapproved, 80, None)), now)
            .is_ok());
        assert!(delayed()
            .evaluate(Some(&record(RequestStatus::Disapproved, 50, None)), now)
            .is_err());
        assert!(delayed()
            .evaluate(Some(&record(RequestStatus::Approved, 100, None)), now)
            .is_err());
    }

    #[test]
    fn test_required_fields() {
        let guard = ActionGuard {
            required_fields: vec!["manager_email".into()],
            ..ActionGuard::default()
        };
        let now = Utc::now();
        assert!(guard
            .evaluate(Some(&record(RequestStatus::Disapproved, 80, Some("m@x.com"))), now)
            .is_ok());
        assert_eq!(
            guard.evaluate(Some(&record(RequestStatus::Disapproved, 80, None)), now),
            Err("request has no manager_email".to_string())
        );
    }
}
