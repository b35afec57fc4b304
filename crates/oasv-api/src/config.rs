//! # Configuration
//!
//! Immutable configuration for the middleware and the handler-side
//! response validator. Both derive `Deserialize` with defaults so they can
//! be read from a YAML/JSON file; closures (the skipper) are attached in
//! code.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Request;
use oasv_core::ValidationOptions;
use serde::Deserialize;

/// Default key under which the validation context is stored.
pub const DEFAULT_CONTEXT_KEY: &str = "validator";

/// Default response content type for handler-side validation.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Default maximum request body size buffered for validation (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Predicate deciding whether a request bypasses validation entirely.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Paths mapped to the methods that bypass validation on them.
///
/// Paths are compared against the framework's matched route template when
/// available, else the raw request path. Methods are stored upper-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct ExemptRoutes {
    routes: BTreeMap<String, BTreeSet<String>>,
}

impl ExemptRoutes {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exempt `methods` on `path`.
    pub fn insert<I, M>(&mut self, path: impl Into<String>, methods: I)
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        self.routes
            .entry(path.into())
            .or_default()
            .extend(methods.into_iter().map(|m| m.as_ref().to_ascii_uppercase()));
    }

    /// Returns true if `(path, method)` is exempt.
    pub fn is_exempt(&self, path: &str, method: &str) -> bool {
        self.routes
            .get(path)
            .is_some_and(|methods| methods.contains(&method.to_ascii_uppercase()))
    }

    /// Returns true if nothing is exempt.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<P, I, M> FromIterator<(P, I)> for ExemptRoutes
where
    P: Into<String>,
    I: IntoIterator<Item = M>,
    M: AsRef<str>,
{
    fn from_iter<T: IntoIterator<Item = (P, I)>>(iter: T) -> Self {
        let mut routes = Self::new();
        for (path, methods) in iter {
            routes.insert(path, methods);
        }
        routes
    }
}

impl From<BTreeMap<String, Vec<String>>> for ExemptRoutes {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        map.into_iter().collect()
    }
}

/// Middleware configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OpenApiConfig {
    /// Bypass predicate, evaluated before anything else.
    #[serde(skip)]
    pub skipper: Option<Skipper>,
    /// Path to the OpenAPI document.
    pub schema: Option<PathBuf>,
    /// In-memory OpenAPI document. Takes precedence over `schema`.
    #[serde(skip)]
    pub schema_bytes: Option<Vec<u8>>,
    /// Key under which the validation context is stored.
    pub context_key: String,
    /// Routes that bypass validation.
    pub exempt_routes: ExemptRoutes,
    /// Skip request body validation.
    pub exclude_request_body: bool,
    /// Maximum request body size buffered for validation.
    pub body_limit: usize,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            skipper: None,
            schema: None,
            schema_bytes: None,
            context_key: DEFAULT_CONTEXT_KEY.to_string(),
            exempt_routes: ExemptRoutes::default(),
            exclude_request_body: false,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl std::fmt::Debug for OpenApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiConfig")
            .field("skipper", &self.skipper.as_ref().map(|_| "<fn>"))
            .field("schema", &self.schema)
            .field(
                "schema_bytes",
                &self.schema_bytes.as_ref().map(|b| format!("<{} bytes>", b.len())),
            )
            .field("context_key", &self.context_key)
            .field("exempt_routes", &self.exempt_routes)
            .field("exclude_request_body", &self.exclude_request_body)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl OpenApiConfig {
    /// Configuration loading the document from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            schema: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configuration using an in-memory document.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            schema_bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    /// Attach a bypass predicate.
    pub fn with_skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    /// Replace the exemption table.
    pub fn with_exempt_routes(mut self, routes: ExemptRoutes) -> Self {
        self.exempt_routes = routes;
        self
    }

    /// Store the validation context under `key`.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    /// Key with the empty string normalized to the default.
    pub fn effective_context_key(&self) -> &str {
        if self.context_key.is_empty() {
            DEFAULT_CONTEXT_KEY
        } else {
            &self.context_key
        }
    }

    /// Options applied to request validation.
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            exclude_request_body: self.exclude_request_body,
            ..ValidationOptions::default()
        }
    }
}

/// Handler-side response validation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Content type used by [`crate::ResponseValidator::validate`].
    pub content_type: String,
    /// Key the middleware stored the validation context under.
    pub validator_key: String,
    /// Request-side switch carried into the shared options. Response
    /// validation never reads it; the middleware's
    /// [`OpenApiConfig::exclude_request_body`] controls request bodies.
    pub exclude_request_body: bool,
    /// Skip response body checks.
    pub exclude_response_body: bool,
    /// Treat an undeclared status code as a failure.
    pub include_response_status: bool,
    /// Collect every issue rather than stopping at the first.
    pub multi_error: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            validator_key: DEFAULT_CONTEXT_KEY.to_string(),
            exclude_request_body: false,
            exclude_response_body: false,
            include_response_status: true,
            multi_error: true,
        }
    }
}

impl HandlerConfig {
    /// Replace empty strings with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.content_type.is_empty() {
            self.content_type = DEFAULT_CONTENT_TYPE.to_string();
        }
        if self.validator_key.is_empty() {
            self.validator_key = DEFAULT_CONTEXT_KEY.to_string();
        }
        self
    }

    /// Options applied to response validation.
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            multi_error: self.multi_error,
            exclude_request_body: self.exclude_request_body,
            exclude_response_body: self.exclude_response_body,
            include_response_status: self.include_response_status,
        }
    }
}
