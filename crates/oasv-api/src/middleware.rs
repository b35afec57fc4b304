//! # Request Validation Middleware
//!
//! Runs the request pipeline in a fixed order, short-circuiting at the
//! first stage that decides the outcome:
//!
//! 1. **Skip**: the configured skipper returns true; pass through.
//! 2. **Exempt**: `(path, method)` is in the exemption table; pass through.
//! 3. **Resolve**: find the operation; 404 or 405 on failure.
//! 4. **Validate**: buffer the body and validate the request; 400 or 422
//!    on failure.
//! 5. **Attach**: store the [`ValidationContext`] and run the handler.
//!
//! Install with `axum::middleware::from_fn_with_state`:
//!
//! ```ignore
//! let validator = Arc::new(OpenApiValidator::from_file("openapi.yaml")?);
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(from_fn_with_state(validator, openapi_middleware));
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use oasv_core::{BodyIssue, ErrorReport, ValidationIssue, ValidationOptions};
use oasv_schema::{
    load, validate_request, RequestInput, RouteError, Router, Schema, SchemaSource, SetupError,
};

use crate::config::{ExemptRoutes, OpenApiConfig, Skipper};
use crate::context::{attach, ValidationContext};
use crate::error::PipelineError;

/// Loaded document plus the immutable pipeline configuration.
#[derive(Clone)]
pub struct OpenApiValidator {
    schema: Arc<Schema>,
    router: Arc<Router>,
    skipper: Option<Skipper>,
    exempt_routes: ExemptRoutes,
    context_key: String,
    options: ValidationOptions,
    body_limit: usize,
}

impl std::fmt::Debug for OpenApiValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiValidator")
            .field("title", &self.schema.title())
            .field("context_key", &self.context_key)
            .field("exempt_routes", &self.exempt_routes)
            .field("options", &self.options)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl OpenApiValidator {
    /// Load the document at `path` with default settings.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, SetupError> {
        Self::with_config(OpenApiConfig::from_file(path))
    }

    /// Load an in-memory document with default settings.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, SetupError> {
        Self::with_config(OpenApiConfig::from_bytes(bytes))
    }

    /// Load the configured document and freeze the configuration.
    ///
    /// Every document problem is reported here; a validator that was
    /// built never fails for setup reasons later.
    pub fn with_config(config: OpenApiConfig) -> Result<Self, SetupError> {
        let source =
            SchemaSource::select(config.schema.as_deref(), config.schema_bytes.as_deref())?;
        let (schema, router) = load(&source)?;

        tracing::info!(
            title = %schema.title(),
            version = %schema.version(),
            exempt = !config.exempt_routes.is_empty(),
            "OpenAPI request validation enabled"
        );

        Ok(Self {
            schema,
            router,
            context_key: config.effective_context_key().to_string(),
            options: config.validation_options(),
            skipper: config.skipper,
            exempt_routes: config.exempt_routes,
            body_limit: config.body_limit,
        })
    }

    /// The loaded document.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The route table.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Key the validation context is stored under.
    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    fn is_exempt(&self, request: &Request) -> bool {
        if self.exempt_routes.is_empty() {
            return false;
        }
        let method = request.method().as_str();
        let matched = request
            .extensions()
            .get::<MatchedPath>()
            .is_some_and(|matched| self.exempt_routes.is_exempt(matched.as_str(), method));
        matched || self.exempt_routes.is_exempt(request.uri().path(), method)
    }

    /// Run the pipeline up to (but not including) the handler.
    ///
    /// Returns the request to forward, with the body restored and the
    /// validation context attached.
    async fn check(&self, request: Request) -> Result<Request, Response> {
        let route = match self.router.find_route(request.method(), request.uri().path()) {
            Ok(route) => route,
            Err(err) => {
                tracing::debug!(
                    method = %request.method(),
                    uri = %request.uri(),
                    error = %err,
                    "request did not resolve to an operation"
                );
                return Err(route_error_response(err));
            }
        };

        let (mut parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, self.body_limit).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let issue: ValidationIssue =
                    BodyIssue::malformed(format!("failed to read request body: {err}")).into();
                let report = ErrorReport::from_request_issues(&[issue]);
                return Err(PipelineError::Report(report).into_response());
            }
        };

        let input = RequestInput {
            method: &parts.method,
            uri: &parts.uri,
            headers: &parts.headers,
            body: &bytes,
        };
        if let Err(errors) = validate_request(&route, &input, &self.options) {
            let report = ErrorReport::from_request_issues(errors.issues());
            tracing::debug!(
                method = %parts.method,
                uri = %parts.uri,
                status = report.status,
                errors = ?report.errors,
                "request failed validation"
            );
            return Err(PipelineError::Report(report).into_response());
        }

        let context = ValidationContext {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            route,
            options: self.options,
        };
        attach(&mut parts.extensions, &self.context_key, context);

        Ok(Request::from_parts(parts, Body::from(bytes)))
    }
}

fn route_error_response(err: RouteError) -> Response {
    let mut response = PipelineError::Report(err.to_report()).into_response();
    if let RouteError::MethodNotAllowed { allowed } = &err {
        let allow = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&allow) {
            response.headers_mut().insert(header::ALLOW, value);
        }
    }
    response
}

/// Axum middleware validating every request against the OpenAPI document.
pub async fn openapi_middleware(
    State(validator): State<Arc<OpenApiValidator>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(skipper) = &validator.skipper {
        if skipper(&request) {
            return next.run(request).await;
        }
    }

    if validator.is_exempt(&request) {
        return next.run(request).await;
    }

    match validator.check(request).await {
        Ok(request) => next.run(request).await,
        Err(response) => response,
    }
}
