//! 内置动作目录：网盘访问请求 SOP（配置中没有 [[actions]] 时使用）

use crate::actions::{ActionEntry, ActionGuard, HandlerType};
use crate::backend::RequestStatus;

/// 超过该小时数的未批准请求视为延迟
pub const DELAY_THRESHOLD_HOURS: f64 = 72.0;

pub fn drive_access_actions() -> Vec<ActionEntry> {
    let pending = vec![RequestStatus::InProgress, RequestStatus::Disapproved];
    let delayed = ActionGuard {
        statuses: pending.clone(),
        min_age_hours: Some(DELAY_THRESHOLD_HOURS),
        ..ActionGuard::default()
    };

    vec![
        ActionEntry::new("ask_request_id", HandlerType::AskUserInput)
            .with_metadata(&["request_id"])
            .with_param_template(
                r#"{"prompt": "Please provide your request ID.", "context": "Needed to look up your drive access request"}"#,
            ),
        ActionEntry::new("check_request_status", HandlerType::ApiCall)
            .with_api_path("/requests/{request_id}")
            .with_method("GET")
            .with_param_template(
                r#"{"purpose": "Retrieve the current status of the access request"}"#,
            ),
        ActionEntry::new("inform_request_approved", HandlerType::ShowMessage)
            .with_guard(ActionGuard {
                statuses: vec![RequestStatus::Approved],
                ..ActionGuard::default()
            })
            .with_param_template(
                r#"{"message": "Drive access for request {request.request_id} is already approved.", "message_type": "success"}"#,
            ),
        ActionEntry::new("inform_request_processing", HandlerType::ShowMessage)
            .with_guard(ActionGuard {
                statuses: pending,
                max_age_hours: Some(DELAY_THRESHOLD_HOURS),
                ..ActionGuard::default()
            })
            .with_param_template(
                r#"{"message": "Request {request.request_id} is being processed. Please check back later.", "message_type": "info"}"#,
            ),
        ActionEntry::new("create_reapproval_ticket", HandlerType::CreateTicket)
            .with_guard(delayed.clone())
            .with_param_template(
                r#"{"title": "Drive Access Re-Approval Needed", "description": "Request {request.request_id} is {request.status} and has waited {request.age_hours} hours.", "priority": "high", "request_id": "{request.request_id}"}"#,
            ),
        ActionEntry::new("notify_manager", HandlerType::SendNotification)
            .with_guard(ActionGuard {
                required_fields: vec!["manager_email".to_string()],
                ..delayed
            })
            .with_param_template(
                r#"{"recipient": "{request.manager_email}", "subject": "Re-approval needed for request {request.request_id}", "message": "Access request {request.request_id} has been delayed beyond 72 hours and needs your re-approval.", "request_id": "{request.request_id}"}"#,
            ),
        ActionEntry::new("notify_requester", HandlerType::SendNotification)
            .with_guard(ActionGuard {
                required_fields: vec!["requester_email".to_string()],
                ..ActionGuard::default()
            })
            .with_param_template(
                r#"{"recipient": "{request.requester_email}", "subject": "Update on access request {request.request_id}", "message": "Your access request is currently {request.status}.", "request_id": "{request.request_id}"}"#,
            ),
        ActionEntry::new("search_knowledge_base", HandlerType::ExternalKnowledge)
            .with_metadata(&["search_query"]),
    ]
}
