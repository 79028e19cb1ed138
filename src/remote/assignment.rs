//! Assignment check: `GET <assignment_url>?username=<user_id>&T_ID=<task_id>`.
//!
//! Valid only when `status == "success"`, `error` is falsy and `is_assigned`
//! is `true`.

use super::{
    AssignmentValidator, Fetched, RemoteAuthority, TRANSPORT_FAILURE_MESSAGE,
    UNAUTHORIZED_MESSAGE, is_success, is_truthy, str_field,
};
use crate::{TaskId, ValidationOutcome};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::info;

const ASSIGNMENT_VALID: &str = "Task assignment is valid. Proceeding with recording.";
const NOT_ASSIGNED: &str = "Task is not assigned to the user.";
const CHECK_FAILED: &str = "Task assignment check failed or invalid response.";
const TASK_NOT_FOUND: &str = "Task not found.";
const VERIFY_ERROR: &str = "An error occurred while verifying task assignment.";

impl AssignmentValidator for RemoteAuthority {
    async fn validate_assignment(&self, user_id: &str, task_id: &TaskId) -> ValidationOutcome {
        let fetched = self
            .fetch(
                &self.assignment_url,
                &[("username", user_id), ("T_ID", task_id.as_str())],
            )
            .await;
        let outcome = assignment_outcome(fetched);
        info!(%user_id, %task_id, valid = outcome.is_valid(), "assignment check");
        outcome
    }
}

pub(crate) fn assignment_outcome(fetched: Fetched) -> ValidationOutcome {
    match fetched {
        Fetched::Json(body) => from_body(&body),
        Fetched::Status(status) => ValidationOutcome::Invalid(status_message(status).to_string()),
        Fetched::Transport => ValidationOutcome::TransportFailure(TRANSPORT_FAILURE_MESSAGE.to_string()),
    }
}

fn from_body(body: &Value) -> ValidationOutcome {
    let assigned = body.get("is_assigned") == Some(&Value::Bool(true));
    if is_success(body) && !is_truthy(body.get("error")) && assigned {
        return ValidationOutcome::Valid(ASSIGNMENT_VALID.to_string());
    }

    let fallback = if is_truthy(body.get("is_assigned")) {
        CHECK_FAILED
    } else {
        NOT_ASSIGNED
    };
    ValidationOutcome::Invalid(str_field(body, "message", fallback).to_string())
}

fn status_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => TASK_NOT_FOUND,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UNAUTHORIZED_MESSAGE,
        _ => VERIFY_ERROR,
    }
}
