//! # Response Validation
//!
//! Validates a handler's response against the operation that served the
//! request. The declared response is found by exact status, then by `NXX`
//! range, then by `default`.

use http::{header, HeaderMap};
use oasv_core::{ResponseIssue, ValidationErrors, ValidationIssue, ValidationOptions};

use crate::coerce::coerce_scalar;
use crate::request::decode_body;
use crate::router::MatchedRoute;

/// Status that carries no body and is never validated.
pub const NO_CONTENT: u16 = 204;

/// Borrowed view of an outgoing response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseInput<'a> {
    /// Response status code.
    pub status: u16,
    /// Response headers, including `Content-Type`.
    pub headers: &'a HeaderMap,
    /// Serialized response body.
    pub body: &'a [u8],
}

/// Validate a response against the matched operation.
pub fn validate_response(
    route: &MatchedRoute,
    input: &ResponseInput<'_>,
    options: &ValidationOptions,
) -> Result<(), ValidationErrors> {
    if input.status == NO_CONTENT {
        return Ok(());
    }

    let Some(declared) = route.operation.responses.find(input.status) else {
        if options.include_response_status {
            return Err(ValidationErrors::new(vec![ResponseIssue::new(format!(
                "status is not supported: {}",
                input.status
            ))
            .into()]));
        }
        return Ok(());
    };

    let mut issues: Vec<ValidationIssue> = Vec::new();

    for header in &declared.headers {
        let value = input
            .headers
            .get(header.name.as_str())
            .and_then(|v| v.to_str().ok());
        let Some(raw) = value else {
            if header.required {
                let reason = format!("response header \"{}\" missing", header.name);
                issues.push(ResponseIssue::new(reason).into());
            }
            continue;
        };
        let Some(schema) = header.schema.as_ref() else {
            continue;
        };
        match coerce_scalar(raw, schema.primitive_type()) {
            Ok(value) => {
                // Nested issues are keyed under the header name.
                let nested: Vec<ValidationIssue> = schema
                    .issues(&value, options.multi_error)
                    .into_iter()
                    .map(|mut issue| {
                        issue.path.insert(0, header.name.clone());
                        issue.into()
                    })
                    .collect();
                if !nested.is_empty() {
                    issues.push(
                        ResponseIssue::with_nested(
                            format!("response header \"{}\" doesn't match schema", header.name),
                            nested,
                        )
                        .into(),
                    );
                }
            }
            Err(reason) => issues.push(
                ResponseIssue::new(format!("response header \"{}\": {reason}", header.name)).into(),
            ),
        }
    }

    if !options.exclude_response_body && !declared.content.is_empty() {
        let content_type = input
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match declared.media(content_type) {
            None => issues.push(
                ResponseIssue::new(format!(
                    "response header Content-Type has unexpected value: \"{content_type}\""
                ))
                .into(),
            ),
            Some(entry) => {
                if let Some(schema) = entry.schema.as_ref() {
                    match decode_body(content_type, input.body) {
                        Ok(value) => {
                            let nested = schema.issues(&value, options.multi_error);
                            if !nested.is_empty() {
                                issues.push(
                                    ResponseIssue::with_nested(
                                        "response body doesn't match schema",
                                        nested.into_iter().map(Into::into).collect(),
                                    )
                                    .into(),
                                );
                            }
                        }
                        Err(reason) => issues.push(
                            ResponseIssue::new(format!("failed to decode response body: {reason}"))
                                .into(),
                        ),
                    }
                }
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
