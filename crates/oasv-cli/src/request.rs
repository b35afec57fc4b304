//! # Request Subcommand
//!
//! Resolves and validates a single request described on the command line,
//! then prints what a client of the middleware would receive.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use http::header::{HeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use oasv_core::{ErrorReport, ValidationOptions};
use oasv_schema::{load, validate_request, RequestInput, Router, SchemaSource};

/// Arguments for the request subcommand.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// OpenAPI document (YAML or JSON).
    pub schema: PathBuf,

    /// HTTP method.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request path, including any query string.
    #[arg(long)]
    pub path: String,

    /// Request header as `Name: value`. Repeatable.
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Request body, or `@file` to read it from a file.
    #[arg(long)]
    pub body: Option<String>,

    /// Content type used when a body is given without a Content-Type header.
    #[arg(long, default_value = "application/json")]
    pub content_type: String,

    /// Stop at the first issue.
    #[arg(long)]
    pub first_error: bool,
}

/// Validate the request; exit code 0 when valid, 1 when rejected.
pub fn run_request(args: &RequestArgs) -> anyhow::Result<u8> {
    let (_, router) = load(&SchemaSource::Path(args.schema.clone()))
        .with_context(|| format!("failed to load {}", args.schema.display()))?;

    match evaluate(&router, args)? {
        None => {
            println!("ok");
            Ok(0)
        }
        Some(report) => {
            println!("{} {}", report.status, report.to_json());
            Ok(1)
        }
    }
}

/// Run the request through routing and validation.
///
/// Returns the client-facing report when the request would be rejected.
pub fn evaluate(router: &Router, args: &RequestArgs) -> anyhow::Result<Option<ErrorReport>> {
    let method: Method = args
        .method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("invalid method '{}'", args.method))?;
    let uri: Uri = args
        .path
        .parse()
        .with_context(|| format!("invalid path '{}'", args.path))?;
    let body = read_body(args.body.as_deref())?;
    let mut headers = parse_headers(&args.headers)?;
    if !body.is_empty() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&args.content_type).context("invalid content type")?,
        );
    }

    let route = match router.find_route(&method, uri.path()) {
        Ok(route) => route,
        Err(err) => {
            tracing::debug!(error = %err, "request did not resolve to an operation");
            return Ok(Some(err.to_report()));
        }
    };
    tracing::debug!(template = route.template(), "resolved operation");

    let options = ValidationOptions {
        multi_error: !args.first_error,
        ..ValidationOptions::default()
    };
    let input = RequestInput {
        method: &method,
        uri: &uri,
        headers: &headers,
        body: &body,
    };
    Ok(validate_request(&route, &input, &options)
        .err()
        .map(|errors| ErrorReport::from_request_issues(errors.issues())))
}

fn read_body(body: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match body {
        None => Ok(Vec::new()),
        Some(arg) => match arg.strip_prefix('@') {
            Some(path) => std::fs::read(path).with_context(|| format!("failed to read {path}")),
            None => Ok(arg.as_bytes().to_vec()),
        },
    }
}

fn parse_headers(raw: &[String]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header '{entry}' must look like 'Name: value'");
        };
        let name: HeaderName = name
            .trim()
            .parse()
            .with_context(|| format!("invalid header name in '{entry}'"))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value in '{entry}'"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
openapi: 3.0.0
info: {title: Users, version: "1"}
paths:
  /users/{name}:
    parameters:
      - {name: name, in: path, required: true, schema: {type: string, minLength: 2}}
    put:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [email]
              properties:
                email: {type: string}
      responses:
        "200": {description: ok}
"#;

    fn router() -> std::sync::Arc<Router> {
        load(&SchemaSource::Bytes(DOC.as_bytes().to_vec())).unwrap().1
    }

    fn args(method: &str, path: &str, body: Option<&str>) -> RequestArgs {
        RequestArgs {
            schema: PathBuf::from("unused.yaml"),
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: body.map(str::to_string),
            content_type: "application/json".to_string(),
            first_error: false,
        }
    }

    #[test]
    fn test_valid_request() {
        let args = args("put", "/users/al", Some(r#"{"email":"a@b"}"#));
        let report = evaluate(&router(), &args).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_unknown_path_and_method() {
        let router = router();
        let report = evaluate(&router, &args("GET", "/nope", None)).unwrap().unwrap();
        assert_eq!(report.status, 404);
        let report = evaluate(&router, &args("GET", "/users/al", None)).unwrap().unwrap();
        assert_eq!(report.status, 405);
    }

    #[test]
    fn test_invalid_request_reports_422() {
        let report = evaluate(&router(), &args("PUT", "/users/a", Some("{}")))
            .unwrap()
            .unwrap();
        assert_eq!(report.status, 422);
        assert_eq!(
            report.errors,
            vec![
                "email: property 'email' is missing",
                "parameter 'name' in path has an error: minimum string length is 2",
            ]
        );
    }

    #[test]
    fn test_missing_body_reports_400() {
        let report = evaluate(&router(), &args("PUT", "/users/al", None))
            .unwrap()
            .unwrap();
        assert_eq!(report.status, 400);
    }

    #[test]
    fn test_body_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, r#"{"email":"a@b"}"#).unwrap();
        let body = read_body(Some(&format!("@{}", path.display()))).unwrap();
        assert_eq!(body, br#"{"email":"a@b"}"#);
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&["X-Trace: abc".to_string()]).unwrap();
        assert_eq!(headers["x-trace"], "abc");
        assert!(parse_headers(&["no-colon".to_string()]).is_err());
    }
}
