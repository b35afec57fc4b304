//! # Request Validation
//!
//! Validates a request against its matched operation: every declared
//! parameter, then the body. Issues are collected rather than
//! short-circuited unless `multi_error` is off.

use std::collections::BTreeMap;

use http::{header, HeaderMap, Method, Uri};
use oasv_core::{
    BodyIssue, ParameterIssue, ParameterLocation, ValidationErrors, ValidationIssue,
    ValidationOptions,
};
use serde_json::Value;

use crate::coerce::coerce_parameter;
use crate::operation::{media_essence, Parameter, RequestBody};
use crate::router::MatchedRoute;

/// Reason used when a required value is absent.
pub const MISSING_VALUE: &str = "value is required but missing";

/// Borrowed view of an incoming request.
#[derive(Debug, Clone, Copy)]
pub struct RequestInput<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request URI, including the query string.
    pub uri: &'a Uri,
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Fully buffered request body.
    pub body: &'a [u8],
}

/// Validate a request against the matched operation.
pub fn validate_request(
    route: &MatchedRoute,
    input: &RequestInput<'_>,
    options: &ValidationOptions,
) -> Result<(), ValidationErrors> {
    let operation = &route.operation;
    let query = query_pairs(input.uri);
    let cookies = cookie_pairs(input.headers);

    let mut issues: Vec<ValidationIssue> = Vec::new();

    for param in &operation.parameters {
        let raw: Vec<String> = match param.location {
            ParameterLocation::Path => {
                route.path_params.get(&param.name).cloned().into_iter().collect()
            }
            ParameterLocation::Query => query.get(&param.name).cloned().unwrap_or_default(),
            ParameterLocation::Header => input
                .headers
                .get_all(param.name.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect(),
            ParameterLocation::Cookie => cookies.get(&param.name).cloned().unwrap_or_default(),
        };
        if let Some(cause) = check_parameter(param, &raw, options.multi_error) {
            issues.push(
                ParameterIssue {
                    name: param.name.clone(),
                    location: param.location,
                    cause,
                }
                .into(),
            );
        }
    }

    if !options.exclude_request_body {
        if let Some(body) = &operation.request_body {
            if let Some(issue) = check_body(body, input.headers, input.body, options.multi_error) {
                issues.push(issue.into());
            }
        }
    }

    if !options.multi_error {
        issues.truncate(1);
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors::new(issues))
    }
}

/// Validate one parameter's raw occurrences. Returns the failure cause.
fn check_parameter(param: &Parameter, raw: &[String], multi_error: bool) -> Option<String> {
    if raw.is_empty() {
        return param.required.then(|| MISSING_VALUE.to_string());
    }
    let value = match coerce_parameter(param, raw) {
        Ok(value) => value,
        Err(reason) => return Some(reason),
    };
    let schema = param.schema.as_ref()?;
    let issues = schema.issues(&value, multi_error);
    if issues.is_empty() {
        return None;
    }
    let reason = issues
        .iter()
        .map(|issue| {
            let field = issue.field();
            if field.is_empty() {
                issue.reason.clone()
            } else {
                format!("{field}: {}", issue.reason)
            }
        })
        .collect::<Vec<_>>()
        .join(" | ");
    Some(schema.diagnostic(&reason, &value))
}

/// Validate a request body. Returns the body issue, if any.
fn check_body(
    declared: &RequestBody,
    headers: &HeaderMap,
    body: &[u8],
    multi_error: bool,
) -> Option<BodyIssue> {
    if body.is_empty() {
        return declared.required.then(|| BodyIssue::malformed(MISSING_VALUE));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Some(entry) = declared.media(content_type) else {
        return Some(BodyIssue::malformed(format!(
            "header Content-Type has unexpected value \"{content_type}\""
        )));
    };
    let schema = entry.schema.as_ref()?;

    let value = match decode_body(content_type, body) {
        Ok(value) => value,
        Err(reason) => {
            return Some(BodyIssue::malformed(format!(
                "failed to decode request body: {reason}"
            )))
        }
    };

    let issues = schema.issues(&value, multi_error);
    if issues.is_empty() {
        None
    } else {
        Some(BodyIssue::nested(issues.into_iter().map(Into::into).collect()))
    }
}

/// Decode a body according to its `Content-Type`.
///
/// JSON (`application/json`, `*/*+json`) is parsed; `text/*` becomes a
/// JSON string. Anything else is unsupported when a schema must be applied.
pub fn decode_body(content_type: &str, body: &[u8]) -> Result<Value, String> {
    let essence = media_essence(content_type);
    if is_json(&essence) {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    } else if essence.starts_with("text/") {
        std::str::from_utf8(body)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| e.to_string())
    } else {
        Err(format!("unsupported content type \"{essence}\""))
    }
}

/// Returns true for `application/json` and `+json` structured suffixes.
pub fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

fn query_pairs(uri: &Uri) -> BTreeMap<String, Vec<String>> {
    let mut pairs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            pairs.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    pairs
}

fn cookie_pairs(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut pairs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for cookie in value.split(';') {
            if let Some((name, value)) = cookie.split_once('=') {
                pairs
                    .entry(name.trim().to_string())
                    .or_default()
                    .push(value.trim().to_string());
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_decode_json_and_text() {
        assert_eq!(
            decode_body("application/json; charset=utf-8", br#"{"a":1}"#).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            decode_body("application/problem+json", b"[]").unwrap(),
            json!([])
        );
        assert_eq!(decode_body("text/plain", b"hi").unwrap(), json!("hi"));
        assert!(decode_body("application/json", b"{").is_err());
        assert!(decode_body("application/octet-stream", b"\x00").is_err());
    }

    #[test]
    fn test_query_pairs_keep_repeats() {
        let uri: Uri = "/x?tag=a&tag=b&q=hello%20world".parse().unwrap();
        let pairs = query_pairs(&uri);
        assert_eq!(pairs["tag"], vec!["a", "b"]);
        assert_eq!(pairs["q"], vec!["hello world"]);
    }

    #[test]
    fn test_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; b = 2"));
        let pairs = cookie_pairs(&headers);
        assert_eq!(pairs["a"], vec!["1"]);
        assert_eq!(pairs["b"], vec!["2"]);
    }
}
