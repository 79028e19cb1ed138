//! Remote authority checks
//!
//! Each check is a single GET with a bounded timeout and no retry. Every
//! failure is folded into a [`ValidationOutcome`]; nothing here returns `Err`
//! once the client is built.

use crate::config::Config;
use crate::{TaskId, ValidationOutcome};
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub mod assignment;
pub mod identity;

/// Shown for every transport-level failure (timeout, refused, DNS, bad body)
pub const TRANSPORT_FAILURE_MESSAGE: &str =
    "Unable to connect to the server. Please try again later.";

/// Shown for HTTP 401/403 by both checks
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized access.";

/// Confirms a user id is known and yields its display name.
pub trait IdentityValidator {
    fn validate_identity(&self, user_id: &str) -> impl Future<Output = ValidationOutcome> + Send;
}

/// Confirms a task is assigned to a user.
pub trait AssignmentValidator {
    fn validate_assignment(
        &self,
        user_id: &str,
        task_id: &TaskId,
    ) -> impl Future<Output = ValidationOutcome> + Send;
}

impl<T: IdentityValidator + ?Sized> IdentityValidator for &T {
    fn validate_identity(&self, user_id: &str) -> impl Future<Output = ValidationOutcome> + Send {
        (**self).validate_identity(user_id)
    }
}

impl<T: AssignmentValidator + ?Sized> AssignmentValidator for &T {
    fn validate_assignment(
        &self,
        user_id: &str,
        task_id: &TaskId,
    ) -> impl Future<Output = ValidationOutcome> + Send {
        (**self).validate_assignment(user_id, task_id)
    }
}

/// What came back from one GET, before protocol interpretation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fetched {
    /// 2xx/3xx with a JSON body
    Json(Value),
    /// 4xx/5xx
    Status(StatusCode),
    /// No usable response
    Transport,
}

/// HTTP client for both checks
#[derive(Debug, Clone)]
pub struct RemoteAuthority {
    client: reqwest::Client,
    identity_url: String,
    assignment_url: String,
}

impl RemoteAuthority {
    pub fn new(
        identity_url: impl Into<String>,
        assignment_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("srot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            identity_url: identity_url.into(),
            assignment_url: assignment_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.identity_url,
            &config.assignment_url,
            config.request_timeout(),
        )
    }

    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Fetched {
        let response = match self.client.get(url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, "request failed: {}", e);
                return Fetched::Transport;
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            debug!(%url, %status, "error status");
            return Fetched::Status(status);
        }

        match response.json::<Value>().await {
            Ok(body) => {
                debug!(%url, %body, "response");
                Fetched::Json(body)
            }
            Err(e) => {
                warn!(%url, "unreadable response body: {}", e);
                Fetched::Transport
            }
        }
    }
}

/// JSON truthiness: null, false, 0, "", [] and {} are falsy; a missing field is falsy.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub(crate) fn is_success(body: &Value) -> bool {
    body.get("status").and_then(Value::as_str) == Some("success")
}

/// String field of the response, or `default` when absent or not a string
pub(crate) fn str_field<'a>(body: &'a Value, key: &str, default: &'a str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or(default)
}
