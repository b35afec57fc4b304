//! # Handler-Side Response Validation
//!
//! Handlers build their response through a [`ResponseValidator`] instead
//! of returning it directly. The value is serialized, checked against the
//! operation's declared response, and only written when it conforms. A
//! non-conforming response never reaches the client: it becomes a
//! [`HandlerError`] and a generic 500.
//!
//! Responses that declare headers are built with
//! [`ResponseValidator::validate_with_headers`].
//!
//! ```ignore
//! async fn create_user(
//!     contexts: ValidationContexts,
//!     State(responses): State<Arc<ResponseValidator>>,
//!     Json(user): Json<User>,
//! ) -> Result<Response, HandlerError> {
//!     responses.validate(&contexts, StatusCode::CREATED, &user)
//! }
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use oasv_core::ErrorReport;
use oasv_schema::operation::media_essence;
use oasv_schema::request::is_json;
use oasv_schema::{validate_response, ResponseInput};
use serde::Serialize;
use serde_json::Value;

use crate::config::HandlerConfig;
use crate::context::{ValidationContext, ValidationContexts};
use crate::error::HandlerError;

/// Validates handler responses against the matched operation.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    config: HandlerConfig,
}

impl ResponseValidator {
    /// Create a validator; empty strings in `config` take their defaults.
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Serialize `body` as the configured content type, validate, and
    /// build the response.
    pub fn validate<T: Serialize>(
        &self,
        contexts: &ValidationContexts,
        status: StatusCode,
        body: &T,
    ) -> Result<Response, HandlerError> {
        self.validate_with_content_type(contexts, status, &self.config.content_type, body)
    }

    /// Like [`validate`](Self::validate) with an explicit content type.
    pub fn validate_with_content_type<T: Serialize>(
        &self,
        contexts: &ValidationContexts,
        status: StatusCode,
        content_type: &str,
        body: &T,
    ) -> Result<Response, HandlerError> {
        if status == StatusCode::NO_CONTENT {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        let context = self.context(contexts)?;
        let bytes = serialize(content_type, body)?;
        self.finish(&context, status, HeaderMap::new(), content_type, bytes)
    }

    /// Like [`validate`](Self::validate), also sending `headers`.
    ///
    /// The headers are checked against the declared response headers and
    /// written on the response. `Content-Type` is always the configured
    /// content type.
    pub fn validate_with_headers<T: Serialize>(
        &self,
        contexts: &ValidationContexts,
        status: StatusCode,
        headers: HeaderMap,
        body: &T,
    ) -> Result<Response, HandlerError> {
        if status == StatusCode::NO_CONTENT {
            let mut response = StatusCode::NO_CONTENT.into_response();
            response.headers_mut().extend(headers);
            return Ok(response);
        }
        let context = self.context(contexts)?;
        let content_type = &self.config.content_type;
        let bytes = serialize(content_type, body)?;
        self.finish(&context, status, headers, content_type, bytes)
    }

    /// Validate an already-serialized body.
    pub fn validate_bytes(
        &self,
        contexts: &ValidationContexts,
        status: StatusCode,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, HandlerError> {
        if status == StatusCode::NO_CONTENT {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        let context = self.context(contexts)?;
        self.finish(&context, status, HeaderMap::new(), content_type, body.into())
    }

    fn context(
        &self,
        contexts: &ValidationContexts,
    ) -> Result<Arc<ValidationContext>, HandlerError> {
        contexts
            .get(&self.config.validator_key)
            .cloned()
            .ok_or_else(|| HandlerError::MissingContext {
                key: self.config.validator_key.clone(),
            })
    }

    fn finish(
        &self,
        context: &ValidationContext,
        status: StatusCode,
        mut headers: HeaderMap,
        content_type: &str,
        body: Bytes,
    ) -> Result<Response, HandlerError> {
        let content_type_value =
            HeaderValue::from_str(content_type).map_err(|e| HandlerError::Serialization {
                content_type: content_type.to_string(),
                reason: e.to_string(),
            })?;
        headers.insert(header::CONTENT_TYPE, content_type_value);

        let input = ResponseInput {
            status: status.as_u16(),
            headers: &headers,
            body: &body,
        };
        let options = self.config.validation_options();
        if let Err(errors) = validate_response(&context.route, &input, &options) {
            let report = ErrorReport::from_response_issues(errors.issues());
            for message in &report.errors {
                tracing::debug!(
                    method = %context.method,
                    uri = %context.uri,
                    status = status.as_u16(),
                    message = %message,
                    "response validation issue"
                );
            }
            return Err(HandlerError::ResponseValidation { report });
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Serialize a value for a content type.
fn serialize<T: Serialize>(content_type: &str, body: &T) -> Result<Bytes, HandlerError> {
    let essence = media_essence(content_type);
    let failed = |reason: String| HandlerError::Serialization {
        content_type: content_type.to_string(),
        reason,
    };
    if is_json(&essence) {
        serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(|e| failed(e.to_string()))
    } else if essence.starts_with("text/") {
        match serde_json::to_value(body).map_err(|e| failed(e.to_string()))? {
            Value::String(text) => Ok(Bytes::from(text)),
            other => Err(failed(format!(
                "expected a string for a text body, got {}",
                json_kind(&other)
            ))),
        }
    } else {
        Err(failed("unsupported content type".to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Extensions, Method, Uri};
    use oasv_schema::{load, SchemaSource};
    use serde_json::json;

    use crate::context::attach;

    const DOC: &str = r#"
openapi: 3.0.0
info: {title: Handler, version: "1"}
paths:
  /items:
    get:
      responses:
        "200":
          description: ok
          headers:
            x-trace-id:
              required: true
              schema: {type: string, minLength: 4}
          content:
            application/json:
              schema:
                type: object
                additionalProperties: false
                required: [id]
                properties:
                  id: {type: integer}
"#;

    fn contexts() -> ValidationContexts {
        let (_, router) = load(&SchemaSource::Bytes(DOC.as_bytes().to_vec())).unwrap();
        let route = router.find_route(&Method::GET, "/items").unwrap();
        let context = ValidationContext {
            method: Method::GET,
            uri: Uri::from_static("/items"),
            headers: HeaderMap::new(),
            route,
            options: Default::default(),
        };
        let mut extensions = Extensions::new();
        attach(&mut extensions, "validator", context);
        extensions.get::<ValidationContexts>().cloned().unwrap()
    }

    fn trace_headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static(value));
        headers
    }

    fn rejected(result: Result<Response, HandlerError>) -> Vec<String> {
        match result {
            Err(HandlerError::ResponseValidation { report }) => report.errors,
            Err(other) => panic!("expected a response validation failure, got {other}"),
            Ok(response) => panic!("expected a rejection, got {}", response.status()),
        }
    }

    #[test]
    fn test_headers_are_validated_and_written() {
        let validator = ResponseValidator::default();
        let response = validator
            .validate_with_headers(
                &contexts(),
                StatusCode::OK,
                trace_headers("abcd"),
                &json!({"id": 1}),
            )
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-trace-id"], "abcd");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_missing_required_header_is_rejected() {
        let validator = ResponseValidator::default();
        let errors = rejected(validator.validate(&contexts(), StatusCode::OK, &json!({"id": 1})));
        assert_eq!(
            errors,
            vec!["response has an error: response header \"x-trace-id\" missing"]
        );
    }

    #[test]
    fn test_invalid_header_names_the_header() {
        let validator = ResponseValidator::default();
        let errors = rejected(validator.validate_with_headers(
            &contexts(),
            StatusCode::OK,
            trace_headers("ab"),
            &json!({"id": 1}),
        ));
        assert_eq!(errors, vec!["x-trace-id: minimum string length is 4"]);
    }

    #[test]
    fn test_single_error_mode_keeps_first_issue() {
        let body = json!({"id": "x", "extra": true});
        let all = ResponseValidator::default();
        let errors = rejected(all.validate_with_headers(
            &contexts(),
            StatusCode::OK,
            trace_headers("abcd"),
            &body,
        ));
        assert_eq!(errors.len(), 2);

        let first = ResponseValidator::new(HandlerConfig {
            multi_error: false,
            ..HandlerConfig::default()
        });
        let errors = rejected(first.validate_with_headers(
            &contexts(),
            StatusCode::OK,
            trace_headers("abcd"),
            &body,
        ));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_request_body_switch_does_not_relax_responses() {
        let validator = ResponseValidator::new(HandlerConfig {
            exclude_request_body: true,
            ..HandlerConfig::default()
        });
        let errors = rejected(validator.validate_with_headers(
            &contexts(),
            StatusCode::OK,
            trace_headers("abcd"),
            &json!({}),
        ));
        assert_eq!(errors, vec!["id: property 'id' is missing"]);
    }

    #[test]
    fn test_serialize_json() {
        let bytes = serialize("application/json", &json!({"a": 1})).unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
    }

    #[test]
    fn test_serialize_text_requires_string() {
        assert_eq!(&serialize("text/plain", &"hi").unwrap()[..], b"hi");
        let err = serialize("text/plain", &json!({"a": 1})).unwrap_err();
        assert!(err.to_string().contains("got object"));
    }

    #[test]
    fn test_serialize_unsupported() {
        assert!(matches!(
            serialize("image/png", &"x"),
            Err(HandlerError::Serialization { .. })
        ));
    }

    #[test]
    fn test_no_content_needs_no_context() {
        let validator = ResponseValidator::default();
        let response = validator
            .validate(&ValidationContexts::default(), StatusCode::NO_CONTENT, &json!({}))
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_missing_context() {
        let validator = ResponseValidator::default();
        let err = validator
            .validate(&ValidationContexts::default(), StatusCode::OK, &json!({}))
            .unwrap_err();
        assert!(matches!(err, HandlerError::MissingContext { key } if key == "validator"));
    }
}
