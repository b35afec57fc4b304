//! # Validation Context
//!
//! After a request passes validation, the middleware stores what response
//! validation needs (the request head, the matched route, and the options)
//! in the request extensions under the configured context key. Handlers
//! pull the table out with the [`ValidationContexts`] extractor and hand it
//! to [`crate::ResponseValidator`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Method, Uri};
use oasv_core::ValidationOptions;
use oasv_schema::MatchedRoute;

/// What response validation needs to know about the request.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// The operation the request was resolved to.
    pub route: MatchedRoute,
    /// Options the request was validated with.
    pub options: ValidationOptions,
}

/// Validation contexts of one request, keyed by context key.
#[derive(Debug, Clone, Default)]
pub struct ValidationContexts {
    by_key: HashMap<String, Arc<ValidationContext>>,
}

impl ValidationContexts {
    /// Context stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Arc<ValidationContext>> {
        self.by_key.get(key)
    }

    /// Returns true if no context was stored.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Store `context` under `key` in the request extensions.
pub fn attach(extensions: &mut Extensions, key: &str, context: ValidationContext) {
    let mut contexts = extensions
        .remove::<ValidationContexts>()
        .unwrap_or_default();
    contexts.by_key.insert(key.to_string(), Arc::new(context));
    extensions.insert(contexts);
}

/// Extracts the stored contexts; never rejects. Requests that bypassed
/// validation yield an empty table.
impl<S: Send + Sync> FromRequestParts<S> for ValidationContexts {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ValidationContexts>()
            .cloned()
            .unwrap_or_default())
    }
}
