//! # Pipeline and Handler Errors
//!
//! Maps validation outcomes to HTTP responses. Request-side reports go to
//! the client as-is; handler-side failures are the server's fault and
//! reach the client only as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oasv_core::ErrorReport;
use thiserror::Error;

/// Outcome of the request pipeline that ends the request early.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Route resolution or request validation failed (400/404/405/422).
    #[error("{}", .0.message)]
    Report(ErrorReport),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let PipelineError::Report(report) = self;
        let status =
            StatusCode::from_u16(report.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(report)).into_response()
    }
}

/// Failure of handler-side response validation.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// No validation context under the configured key; the middleware did
    /// not run for this request or uses a different key.
    #[error("no validation context under key '{key}'")]
    MissingContext {
        /// The key that was looked up.
        key: String,
    },

    /// The value could not be serialized as the requested content type.
    #[error("cannot serialize response as '{content_type}': {reason}")]
    Serialization {
        /// Requested content type.
        content_type: String,
        /// Serializer diagnostic.
        reason: String,
    },

    /// The response violates the operation's declared contract.
    #[error("response validation failed: {}", .report.errors.join(" | "))]
    ResponseValidation {
        /// Converted validation issues, for logs only.
        report: ErrorReport,
    },
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "handler response rejected");
        internal_server_error()
    }
}

fn internal_server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorReport::new(500, "Internal Server Error")),
    )
        .into_response()
}
