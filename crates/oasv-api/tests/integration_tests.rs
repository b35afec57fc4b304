//! # Integration Tests for oasv-api
//!
//! Drives an Axum app wired with the validation middleware and handler-side
//! response validation: setup failures, route resolution, request
//! validation, exemptions, and response contract enforcement.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use oasv_api::{
    openapi_middleware, ExemptRoutes, HandlerConfig, HandlerError, OpenApiConfig,
    OpenApiValidator, ResponseValidator, ValidationContexts,
};
use oasv_schema::SetupError;

type Responses = State<Arc<ResponseValidator>>;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

async fn root(contexts: ValidationContexts, State(r): Responses) -> Result<Response, HandlerError> {
    r.validate(&contexts, StatusCode::OK, &json!({"message": "hello"}))
}

async fn create_user(
    contexts: ValidationContexts,
    State(r): Responses,
    Json(user): Json<Value>,
) -> Result<Response, HandlerError> {
    r.validate(&contexts, StatusCode::CREATED, &user)
}

async fn update_user(
    contexts: ValidationContexts,
    State(r): Responses,
    Json(user): Json<Value>,
) -> Result<Response, HandlerError> {
    r.validate(&contexts, StatusCode::OK, &user)
}

async fn broken(
    contexts: ValidationContexts,
    State(r): Responses,
) -> Result<Response, HandlerError> {
    r.validate(&contexts, StatusCode::OK, &json!({"invalid": "secret detail"}))
}

async fn text(contexts: ValidationContexts, State(r): Responses) -> Result<Response, HandlerError> {
    r.validate_with_content_type(&contexts, StatusCode::OK, "text/plain", &"hello")
}

async fn no_content(
    contexts: ValidationContexts,
    State(r): Responses,
) -> Result<Response, HandlerError> {
    r.validate(&contexts, StatusCode::NO_CONTENT, &json!(null))
}

/// Copies `x-trace-source` from the request into `x-trace-id`, if sent.
async fn traced(
    contexts: ValidationContexts,
    State(r): Responses,
    request_headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let mut headers = HeaderMap::new();
    if let Some(trace) = request_headers.get("x-trace-source") {
        headers.insert("x-trace-id", trace.clone());
    }
    r.validate_with_headers(&contexts, StatusCode::OK, headers, &json!({"message": "traced"}))
}

async fn exempt() -> &'static str {
    "exempt"
}

/// Helper: build the app around a middleware and handler configuration.
fn app_with(config: OpenApiConfig, handler: HandlerConfig) -> Router {
    let validator = Arc::new(OpenApiValidator::with_config(config).unwrap());
    let responses = Arc::new(ResponseValidator::new(handler));
    Router::new()
        .route("/", get(root))
        .route("/validation", post(create_user))
        .route("/validation/{username}", post(update_user))
        .route("/broken", get(broken))
        .route("/text", get(text))
        .route("/traced", get(traced))
        .route("/no-content", post(no_content))
        .route("/exempt", get(exempt))
        .with_state(responses)
        .layer(from_fn_with_state(validator, openapi_middleware))
}

/// Helper: build the app with default settings.
fn test_app() -> Router {
    app_with(
        OpenApiConfig::from_file(fixture("openapi.yaml")),
        HandlerConfig::default(),
    )
}

/// Helper: read response body as string.
async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Helper: read response body as JSON.
async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// -- Setup --------------------------------------------------------------------

#[test]
fn test_setup_requires_a_source() {
    let err = OpenApiValidator::with_config(OpenApiConfig::default()).unwrap_err();
    assert!(matches!(err, SetupError::MissingSource));
    assert_eq!(err.to_string(), "either schema or schema bytes is required");
}

#[test]
fn test_setup_rejects_invalid_document() {
    let err = OpenApiValidator::from_file(fixture("invalid.yaml")).unwrap_err();
    assert!(matches!(err, SetupError::InvalidDocument { .. }));
}

#[test]
fn test_setup_rejects_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = OpenApiValidator::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, SetupError::Io { .. }));
}

#[test]
fn test_setup_from_bytes_and_copied_file() {
    let bytes = std::fs::read(fixture("openapi.yaml")).unwrap();
    let validator = OpenApiValidator::from_bytes(bytes.clone()).unwrap();
    assert_eq!(validator.schema().title(), "Middleware Fixture");
    assert_eq!(validator.context_key(), "validator");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.yaml");
    std::fs::write(&path, &bytes).unwrap();
    assert!(OpenApiValidator::from_file(&path).is_ok());
}

// -- Route Resolution ---------------------------------------------------------

#[tokio::test]
async fn test_valid_get_passes_through() {
    let response = test_app().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(body_json(response).await, json!({"message": "hello"}));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let response = test_app().oneshot(get_request("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, r#"{"message":"Path not found"}"#);
}

#[tokio::test]
async fn test_undecodable_path_is_404() {
    let response = test_app().oneshot(get_request("/users/%FF")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, r#"{"message":"Path not found"}"#);
}

#[tokio::test]
async fn test_undeclared_method_is_405() {
    let request = Request::builder()
        .method("DELETE")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET");
    assert_eq!(body_json(response).await, json!({"message": "Method not allowed"}));
}

// -- Request Validation -------------------------------------------------------

#[tokio::test]
async fn test_missing_body_is_400() {
    let response = test_app()
        .oneshot(json_request("POST", "/validation", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({
            "message": "Request error",
            "errors": ["request body has an error: value is required but missing"]
        })
    );
}

#[tokio::test]
async fn test_body_schema_failures_are_422() {
    let response = test_app()
        .oneshot(json_request("POST", "/validation", r#"{"invalid":"value"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await,
        json!({
            "message": "Validation error",
            "errors": [
                "property 'invalid' is unsupported",
                "username: property 'username' is missing"
            ]
        })
    );
}

#[tokio::test]
async fn test_wrong_property_type_is_422() {
    let response = test_app()
        .oneshot(json_request("POST", "/validation", r#"{"username":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["errors"], json!(["username: value must be a string"]));
}

#[tokio::test]
async fn test_parameter_failures_are_422() {
    let request = Request::builder()
        .method("POST")
        .uri("/validation/a?limit=200")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-username", "a")
        .body(Body::from(r#"{"username":"alice"}"#))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["errors"],
        json!([
            "parameter 'x-username' in header has an error: minimum string length is 2",
            "parameter 'username' in path has an error: minimum string length is 2",
            "parameter 'limit' in query has an error: number must be at most 100"
        ])
    );
}

#[tokio::test]
async fn test_valid_post_reaches_handler() {
    let response = test_app()
        .oneshot(json_request("POST", "/validation", r#"{"username":"alice"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({"username": "alice"}));
}

#[tokio::test]
async fn test_valid_parameters_reach_handler() {
    let request = Request::builder()
        .method("POST")
        .uri("/validation/alice?limit=10")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-username", "alice")
        .body(Body::from(r#"{"username":"alice"}"#))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_body_is_400() {
    let config = OpenApiConfig {
        body_limit: 8,
        ..OpenApiConfig::from_file(fixture("openapi.yaml"))
    };
    let app = app_with(config, HandlerConfig::default());
    let response = app
        .oneshot(json_request("POST", "/validation", r#"{"username":"alice"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["errors"][0]
        .as_str()
        .unwrap()
        .starts_with("request body has an error: failed to read request body"));
}

#[tokio::test]
async fn test_excluded_request_body_is_not_checked() {
    let config = OpenApiConfig {
        exclude_request_body: true,
        ..OpenApiConfig::from_file(fixture("openapi.yaml"))
    };
    let app = app_with(config, HandlerConfig::default());
    let response = app
        .oneshot(json_request("POST", "/validation", r#"{"username":"alice","extra":1}"#))
        .await
        .unwrap();
    // The request passes; the echoed body then breaks the response contract.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// -- Bypass -------------------------------------------------------------------

#[tokio::test]
async fn test_undeclared_route_is_404_unless_exempt() {
    let response = test_app().oneshot(get_request("/exempt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let config = OpenApiConfig::from_file(fixture("openapi.yaml"))
        .with_exempt_routes([("/exempt", ["GET"])].into_iter().collect::<ExemptRoutes>());
    let app = app_with(config, HandlerConfig::default());
    let response = app.oneshot(get_request("/exempt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "exempt");
}

#[tokio::test]
async fn test_exempt_route_bypasses_invalid_body() {
    let config = OpenApiConfig::from_file(fixture("openapi.yaml"))
        .with_exempt_routes([("/validation", ["post"])].into_iter().collect::<ExemptRoutes>());
    let app = app_with(config, HandlerConfig::default());
    let response = app
        .oneshot(json_request("POST", "/validation", r#"{"invalid":"value"}"#))
        .await
        .unwrap();
    // The handler runs, but without a validation context it cannot respond.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_skipper_bypasses_validation() {
    let config = OpenApiConfig::from_file(fixture("openapi.yaml"))
        .with_skipper(|request| request.headers().contains_key("x-skip-validation"));
    let app = app_with(config, HandlerConfig::default());
    let request = Request::builder()
        .uri("/exempt")
        .header("x-skip-validation", "1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Response Validation ------------------------------------------------------

#[tokio::test]
async fn test_broken_response_is_generic_500() {
    let response = test_app().oneshot(get_request("/broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert_eq!(body, r#"{"message":"Internal Server Error"}"#);
    assert!(!body.contains("secret detail"));
}

#[tokio::test]
async fn test_no_content_skips_response_validation() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/no-content")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_text_response() {
    let response = test_app().oneshot(get_request("/text")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_string(response).await, "hello");
}

#[tokio::test]
async fn test_custom_context_key() {
    let config = OpenApiConfig::from_file(fixture("openapi.yaml")).with_context_key("contract");
    let handler = HandlerConfig {
        validator_key: "contract".to_string(),
        ..HandlerConfig::default()
    };
    let response = app_with(config.clone(), handler)
        .oneshot(get_request("/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app_with(config, HandlerConfig::default())
        .oneshot(get_request("/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_excluded_response_body_is_not_checked() {
    let handler = HandlerConfig {
        exclude_response_body: true,
        ..HandlerConfig::default()
    };
    let app = app_with(OpenApiConfig::from_file(fixture("openapi.yaml")), handler);
    let response = app.oneshot(get_request("/broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_required_response_header_is_sent() {
    let request = Request::builder()
        .uri("/traced")
        .header("x-trace-source", "abcd-1234")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-trace-id"], "abcd-1234");
    assert_eq!(body_json(response).await, json!({"message": "traced"}));
}

#[tokio::test]
async fn test_missing_required_response_header_is_500() {
    let response = test_app().oneshot(get_request("/traced")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        r#"{"message":"Internal Server Error"}"#
    );
}

#[tokio::test]
async fn test_invalid_response_header_is_500() {
    let request = Request::builder()
        .uri("/traced")
        .header("x-trace-source", "ab")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("x-trace-id").is_none());
}

#[tokio::test]
async fn test_single_error_mode_still_rejects_broken_response() {
    let handler = HandlerConfig {
        multi_error: false,
        ..HandlerConfig::default()
    };
    let app = app_with(OpenApiConfig::from_file(fixture("openapi.yaml")), handler);
    let response = app.oneshot(get_request("/broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_string(response).await.contains("secret detail"));
}

// -- Determinism --------------------------------------------------------------

#[tokio::test]
async fn test_repeated_invalid_request_gets_identical_body() {
    let app = test_app();
    let send = || {
        Request::builder()
            .method("POST")
            .uri("/validation/a?limit=200")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-username", "a")
            .body(Body::from(r#"{"invalid":"value","username":1}"#))
            .unwrap()
    };

    let first = app.clone().oneshot(send()).await.unwrap();
    let second = app.oneshot(send()).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let first = first.into_body().collect().await.unwrap().to_bytes();
    let second = second.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(first, second);
}
