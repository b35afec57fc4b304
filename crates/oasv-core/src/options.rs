//! # Validation Options
//!
//! One immutable options value steers both request and response
//! validation. Request validation reads `multi_error` and
//! `exclude_request_body`; response validation reads `multi_error`,
//! `exclude_response_body`, and `include_response_status`.

use serde::{Deserialize, Serialize};

/// Switches that control which checks run and how many failures are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Collect every failure instead of stopping at the first one.
    pub multi_error: bool,
    /// Skip request body validation entirely.
    pub exclude_request_body: bool,
    /// Skip response body validation entirely.
    pub exclude_response_body: bool,
    /// Treat a response status missing from the operation as a failure.
    pub include_response_status: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            multi_error: true,
            exclude_request_body: false,
            exclude_response_body: false,
            include_response_status: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ValidationOptions::default();
        assert!(opts.multi_error);
        assert!(opts.include_response_status);
        assert!(!opts.exclude_request_body);
        assert!(!opts.exclude_response_body);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let opts: ValidationOptions =
            serde_json::from_str(r#"{"exclude_response_body": true}"#).unwrap();
        assert!(opts.exclude_response_body);
        assert!(opts.include_response_status);
        assert!(opts.multi_error);
    }
}
