//! # Error Report
//!
//! The stable contract returned to clients. A report serializes as
//! `{"message": "...", "errors": [...]}`; `errors` is omitted when empty
//! and the status code travels on the HTTP status line, not in the body.

use serde::{Deserialize, Serialize};

use crate::convert::{convert, flatten, BODY_KEY};
use crate::issue::ValidationIssue;

/// Status for a malformed or missing request body.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status when no path template matches.
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status when a template matches but not for the method.
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
/// Status for semantic request validation failures.
pub const STATUS_UNPROCESSABLE_ENTITY: u16 = 422;
/// Status for server-side contract violations.
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// Client-facing validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// HTTP status code for the response line.
    #[serde(skip)]
    pub status: u16,
    /// Top-level summary.
    pub message: String,
    /// Ordered human-readable messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ErrorReport {
    /// Build a report with no detail messages.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// 404 for a path that matches no template.
    pub fn path_not_found() -> Self {
        Self::new(STATUS_NOT_FOUND, "Path not found")
    }

    /// 405 for a template that does not declare the method.
    pub fn method_not_allowed() -> Self {
        Self::new(STATUS_METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// Convert request validation issues into a client report.
    ///
    /// A `body` bucket means the request itself was malformed: the report
    /// is a 400 carrying only that bucket. Otherwise every bucket is
    /// flattened in key order into a 422.
    pub fn from_request_issues(issues: &[ValidationIssue]) -> Self {
        let buckets = convert(issues);
        if let Some(body) = buckets.get(BODY_KEY) {
            return Self {
                status: STATUS_BAD_REQUEST,
                message: "Request error".to_string(),
                errors: body.clone(),
            };
        }
        Self {
            status: STATUS_UNPROCESSABLE_ENTITY,
            message: "Validation error".to_string(),
            errors: flatten(&buckets),
        }
    }

    /// Convert response validation issues into a server-side report.
    ///
    /// The messages are meant for logs. Callers must not send them to the
    /// client.
    pub fn from_response_issues(issues: &[ValidationIssue]) -> Self {
        Self {
            status: STATUS_INTERNAL_SERVER_ERROR,
            message: "Response validation failed".to_string(),
            errors: flatten(&convert(issues)),
        }
    }

    /// Serialize the client-facing body.
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a struct of strings cannot fail.
        serde_json::to_value(self)
            .unwrap_or_else(|_| serde_json::json!({ "message": self.message }))
    }
}
