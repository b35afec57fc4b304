//! # Error Types
//!
//! Setup errors are fatal: they abort middleware construction so a server
//! never starts with a broken contract. Route errors are per-request and
//! distinguished by variant, never by message text.

use std::path::PathBuf;

use http::Method;
use oasv_core::ErrorReport;
use thiserror::Error;

/// Failure while loading, checking, or compiling an OpenAPI document.
#[derive(Error, Debug)]
pub enum SetupError {
    /// Neither a schema path nor schema bytes were configured.
    #[error("either schema or schema bytes is required")]
    MissingSource,

    /// The schema file (or an externally referenced file) could not be read.
    #[error("failed loading schema file '{}': {source}", .path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML/JSON.
    #[error("failed parsing schema: {reason}")]
    Parse {
        /// Parser diagnostic.
        reason: String,
    },

    /// The document parsed but is not a consistent OpenAPI 3.0 document.
    #[error("failed validating schema: {reason}")]
    InvalidDocument {
        /// What is inconsistent.
        reason: String,
    },

    /// A `$ref` points nowhere, or reference chains do not terminate.
    #[error("unresolvable reference '{reference}': {reason}")]
    UnresolvedReference {
        /// The `$ref` value as written.
        reference: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A schema object could not be compiled into a validator.
    #[error("failed compiling schema at {location}: {reason}")]
    Compile {
        /// Where in the document the schema lives.
        location: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// The route table could not be built.
    #[error("failed creating router: {reason}")]
    Router {
        /// What is wrong with the path templates.
        reason: String,
    },
}

/// Failure to resolve a request to an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No path template matches the request path.
    #[error("no matching operation was found")]
    PathNotFound,

    /// A path template matches, but not for the request method.
    #[error("method not allowed")]
    MethodNotAllowed {
        /// Methods the matching template does declare.
        allowed: Vec<Method>,
    },

    /// The request path could not be decoded.
    #[error("invalid request path: {reason}")]
    InvalidPath {
        /// Decoder diagnostic.
        reason: String,
    },
}

impl RouteError {
    /// Client-facing report for a resolution failure.
    ///
    /// A path that cannot be decoded cannot match any template, so it is
    /// reported like any other unknown path. `InvalidPath` is the only
    /// resolver failure besides not-found and method-not-allowed; it is
    /// folded into 404 here rather than passed on as a server error.
    pub fn to_report(&self) -> ErrorReport {
        match self {
            RouteError::MethodNotAllowed { .. } => ErrorReport::method_not_allowed(),
            RouteError::PathNotFound | RouteError::InvalidPath { .. } => {
                ErrorReport::path_not_found()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_reports() {
        assert_eq!(RouteError::PathNotFound.to_report().status, 404);
        assert_eq!(
            RouteError::InvalidPath {
                reason: "bad utf-8".into()
            }
            .to_report()
            .status,
            404
        );
        let report = RouteError::MethodNotAllowed {
            allowed: vec![Method::GET],
        }
        .to_report();
        assert_eq!(report.status, 405);
        assert_eq!(report.message, "Method not allowed");
    }
}
