//! # Error Taxonomy Converter
//!
//! Flattens a tree of [`ValidationIssue`]s into buckets keyed by field or
//! parameter location, then into one ordered message list.
//!
//! ## Keys and messages
//!
//! | Issue | Key | Message |
//! |-------|-----|---------|
//! | schema | dot-joined pointer (`""` at root) | `<field>: <reason>` or `<reason>` |
//! | parameter | `<location>.<name>` | `parameter '<name>' in <location> has an error: <first line>` |
//! | body, nested | keys of the nested issues | recursive |
//! | body, malformed | `body` | full issue text |
//! | response, nested | keys of the nested issues | recursive |
//! | response, bare | `response` | full issue text |
//! | unknown | `unknown` | issue text |
//!
//! Double quotes in schema reasons become single quotes.
//!
//! ## Ordering
//!
//! Buckets live in a `BTreeMap`, so [`flatten`] emits messages in
//! lexicographic key order. Within a bucket, messages keep the order in
//! which the validator reported them.

use std::collections::BTreeMap;

use crate::issue::{BodyCause, ValidationIssue};

/// Bucket for malformed or missing request bodies.
pub const BODY_KEY: &str = "body";
/// Bucket for response failures without nested schema detail.
pub const RESPONSE_KEY: &str = "response";
/// Bucket for unclassified issues.
pub const UNKNOWN_KEY: &str = "unknown";

/// Messages grouped by field/location key, in key order.
pub type IssueBuckets = BTreeMap<String, Vec<String>>;

/// Convert raw issues into key-ordered message buckets.
pub fn convert(issues: &[ValidationIssue]) -> IssueBuckets {
    let mut buckets = IssueBuckets::new();
    collect(issues, &mut buckets);
    buckets
}

/// Concatenate bucket messages in key order.
pub fn flatten(buckets: &IssueBuckets) -> Vec<String> {
    buckets.values().flatten().cloned().collect()
}

fn collect(issues: &[ValidationIssue], buckets: &mut IssueBuckets) {
    for issue in issues {
        match issue {
            ValidationIssue::Schema(schema) => {
                let field = schema.field();
                let message = if field.is_empty() {
                    schema.reason.clone()
                } else {
                    format!("{field}: {}", schema.reason)
                };
                push(buckets, field, message.replace('"', "'"));
            }
            ValidationIssue::Parameter(param) => {
                let location = param.location.as_str();
                let first_line = param.cause.split('\n').next().unwrap_or_default();
                push(
                    buckets,
                    format!("{location}.{}", param.name),
                    format!(
                        "parameter '{}' in {location} has an error: {first_line}",
                        param.name
                    ),
                );
            }
            ValidationIssue::RequestBody(body) => match &body.cause {
                BodyCause::Nested(nested) => collect(nested, buckets),
                BodyCause::Malformed(_) => push(buckets, BODY_KEY.to_string(), body.to_string()),
            },
            ValidationIssue::Response(response) => {
                if response.nested.is_empty() {
                    push(buckets, RESPONSE_KEY.to_string(), response.to_string());
                } else {
                    collect(&response.nested, buckets);
                }
            }
            ValidationIssue::Unknown(text) => push(buckets, UNKNOWN_KEY.to_string(), text.clone()),
        }
    }
}

fn push(buckets: &mut IssueBuckets, key: String, message: String) {
    buckets.entry(key).or_default().push(message);
}
