//! Identity check: `GET <identity_url>?username=<user_id>`.
//!
//! Success looks like `{"status": "success", "fullname": "Alice A"}`; anything
//! else with a readable body is a rejection carrying the server's `message`.

use super::{
    Fetched, IdentityValidator, RemoteAuthority, TRANSPORT_FAILURE_MESSAGE, UNAUTHORIZED_MESSAGE,
    is_success, str_field,
};
use crate::{EMPTY_USER_ID_MESSAGE, ValidationOutcome};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::info;

const USER_NOT_FOUND: &str = "User not found.";
const VERIFY_ERROR: &str = "An error occurred while verifying the user.";
const UNKNOWN_ERROR: &str = "Unknown error occurred.";
const MISSING_FULLNAME: &str = "N/A";

impl IdentityValidator for RemoteAuthority {
    async fn validate_identity(&self, user_id: &str) -> ValidationOutcome {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return ValidationOutcome::Invalid(EMPTY_USER_ID_MESSAGE.to_string());
        }
        let fetched = self.fetch(&self.identity_url, &[("username", user_id)]).await;
        let outcome = identity_outcome(fetched);
        info!(%user_id, valid = outcome.is_valid(), "identity check");
        outcome
    }
}

pub(crate) fn identity_outcome(fetched: Fetched) -> ValidationOutcome {
    match fetched {
        Fetched::Json(body) => from_body(&body),
        Fetched::Status(status) => ValidationOutcome::Invalid(status_message(status).to_string()),
        Fetched::Transport => ValidationOutcome::TransportFailure(TRANSPORT_FAILURE_MESSAGE.to_string()),
    }
}

fn from_body(body: &Value) -> ValidationOutcome {
    if is_success(body) {
        ValidationOutcome::Valid(str_field(body, "fullname", MISSING_FULLNAME).to_string())
    } else {
        ValidationOutcome::Invalid(str_field(body, "message", UNKNOWN_ERROR).to_string())
    }
}

fn status_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => USER_NOT_FOUND,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UNAUTHORIZED_MESSAGE,
        _ => VERIFY_ERROR,
    }
}
