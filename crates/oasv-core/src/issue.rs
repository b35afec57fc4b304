//! # Raw Validation Issues
//!
//! The polymorphic error model produced by the request and response
//! validators. Each variant keeps exactly the data the taxonomy converter
//! needs to derive a bucket key and a message; nothing here is formatted
//! for clients yet.
//!
//! A single validation pass returns a [`ValidationErrors`] value, the
//! multi-error that aggregates every independent failure found.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a parameter lives in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Templated path segment.
    Path,
    /// URL query string.
    Query,
    /// Request header.
    Header,
    /// Cookie value.
    Cookie,
}

impl ParameterLocation {
    /// The lowercase name used in OpenAPI documents and bucket keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schema-level violation at a location inside a JSON value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct SchemaIssue {
    /// Decoded JSON pointer segments to the offending value. Empty at the root.
    pub path: Vec<String>,
    /// Human-readable reason, e.g. `property "username" is missing`.
    pub reason: String,
}

impl SchemaIssue {
    /// Create a schema issue at the given pointer segments.
    pub fn new(path: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }

    /// The dot-joined field name, or an empty string at the document root.
    pub fn field(&self) -> String {
        self.path.join(".")
    }
}

/// A parameter that is missing, cannot be coerced, or violates its schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parameter \"{name}\" in {location} has an error: {cause}")]
pub struct ParameterIssue {
    /// Declared parameter name.
    pub name: String,
    /// Declared parameter location.
    pub location: ParameterLocation,
    /// Underlying cause. May span several lines of diagnostics.
    pub cause: String,
}

/// The underlying cause of a request body failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyCause {
    /// The body decoded but its content violates the schema.
    Nested(Vec<ValidationIssue>),
    /// The body is missing, undecodable, or of an undeclared media type.
    Malformed(String),
}

/// A request body failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("request body has an error: {}", describe_body(.cause))]
pub struct BodyIssue {
    /// What went wrong.
    pub cause: BodyCause,
}

impl BodyIssue {
    /// A missing/undecodable body.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            cause: BodyCause::Malformed(reason.into()),
        }
    }

    /// A decoded body whose content violates the schema.
    pub fn nested(issues: Vec<ValidationIssue>) -> Self {
        Self {
            cause: BodyCause::Nested(issues),
        }
    }
}

fn describe_body(cause: &BodyCause) -> String {
    match cause {
        BodyCause::Malformed(reason) => reason.clone(),
        BodyCause::Nested(issues) => format!("doesn't match schema: {}", join(issues)),
    }
}

/// A response that does not conform to its declared contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("response has an error: {}", describe_response(.reason, .nested))]
pub struct ResponseIssue {
    /// Summary of the mismatch, e.g. `status is not supported`.
    pub reason: String,
    /// Schema issues found in the response body or headers, if any.
    pub nested: Vec<ValidationIssue>,
}

impl ResponseIssue {
    /// A response mismatch with no nested detail.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            nested: Vec::new(),
        }
    }

    /// A response mismatch carrying nested schema issues.
    pub fn with_nested(reason: impl Into<String>, nested: Vec<ValidationIssue>) -> Self {
        Self {
            reason: reason.into(),
            nested,
        }
    }
}

fn describe_response(reason: &str, nested: &[ValidationIssue]) -> String {
    if nested.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}: {}", join(nested))
    }
}

/// One raw validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Schema violation inside a JSON value.
    #[error(transparent)]
    Schema(SchemaIssue),

    /// Parameter failure.
    #[error(transparent)]
    Parameter(ParameterIssue),

    /// Request body failure.
    #[error(transparent)]
    RequestBody(BodyIssue),

    /// Response contract failure.
    #[error(transparent)]
    Response(ResponseIssue),

    /// Anything the validators could not classify.
    #[error("{0}")]
    Unknown(String),
}

impl From<SchemaIssue> for ValidationIssue {
    fn from(issue: SchemaIssue) -> Self {
        Self::Schema(issue)
    }
}

impl From<ParameterIssue> for ValidationIssue {
    fn from(issue: ParameterIssue) -> Self {
        Self::Parameter(issue)
    }
}

impl From<BodyIssue> for ValidationIssue {
    fn from(issue: BodyIssue) -> Self {
        Self::RequestBody(issue)
    }
}

impl From<ResponseIssue> for ValidationIssue {
    fn from(issue: ResponseIssue) -> Self {
        Self::Response(issue)
    }
}

fn join(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// A multi-error: every independent failure found in one validation pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", join(.issues))]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    /// Wrap a non-empty list of issues.
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Returns the number of issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns true if there are no issues.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns a slice of all issues.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

impl From<Vec<ValidationIssue>> for ValidationErrors {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self::new(issues)
    }
}
