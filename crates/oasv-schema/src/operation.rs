//! # Compiled Operations
//!
//! One [`Operation`] per `(path, method)` pair in the document, with every
//! `$ref` resolved and every schema compiled. Operations are built once at
//! load time and shared read-only through `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use http::Method;
use oasv_core::ParameterLocation;
use openapiv3::{
    Components, Header, OpenAPI, ParameterData, ParameterSchemaOrContent, PathItem, ReferenceOr,
    RequestBody as ApiRequestBody, Response as ApiResponse, StatusCode,
};
use serde_json::Value;

use crate::compile::{CompiledSchema, SchemaCompiler};
use crate::error::SetupError;
use crate::refs::MAX_REF_DEPTH;

/// How a parameter's raw string is turned into a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// Coerce according to the schema's primitive type.
    Schema,
    /// The raw value is a JSON document (`content`-based parameter).
    Json,
}

/// A declared parameter.
#[derive(Debug)]
pub struct Parameter {
    /// Declared name.
    pub name: String,
    /// Declared location.
    pub location: ParameterLocation,
    /// Whether the parameter must be present.
    pub required: bool,
    /// Whether array values are sent as repeated keys (`form` + explode).
    pub explode: bool,
    /// How the raw string is decoded.
    pub encoding: ParameterEncoding,
    /// Compiled schema, if one is declared.
    pub schema: Option<CompiledSchema>,
}

/// One media type entry of a body declaration.
#[derive(Debug)]
pub struct MediaEntry {
    /// Media type key as declared, lowercased (`application/json`, `text/*`).
    pub media_type: String,
    /// Compiled schema, if one is declared.
    pub schema: Option<CompiledSchema>,
}

/// Declared request body.
#[derive(Debug)]
pub struct RequestBody {
    /// Whether an empty body is a failure.
    pub required: bool,
    /// Accepted media types.
    pub content: Vec<MediaEntry>,
}

impl RequestBody {
    /// Find the declared media entry for a `Content-Type` value.
    pub fn media(&self, content_type: &str) -> Option<&MediaEntry> {
        find_media(&self.content, content_type)
    }
}

/// A declared response header.
#[derive(Debug)]
pub struct ResponseHeader {
    /// Header name, lowercased.
    pub name: String,
    /// Whether the header must be present.
    pub required: bool,
    /// Compiled schema, if one is declared.
    pub schema: Option<CompiledSchema>,
}

/// A declared response.
#[derive(Debug)]
pub struct Response {
    /// Declared headers.
    pub headers: Vec<ResponseHeader>,
    /// Declared media types. Empty means the body is not checked.
    pub content: Vec<MediaEntry>,
}

impl Response {
    /// Find the declared media entry for a `Content-Type` value.
    pub fn media(&self, content_type: &str) -> Option<&MediaEntry> {
        find_media(&self.content, content_type)
    }
}

/// Declared responses of an operation.
#[derive(Debug, Default)]
pub struct Responses {
    by_code: BTreeMap<u16, Response>,
    by_range: BTreeMap<u16, Response>,
    default: Option<Response>,
}

impl Responses {
    /// Look up a status: exact code, then `NXX` range, then `default`.
    pub fn find(&self, status: u16) -> Option<&Response> {
        self.by_code
            .get(&status)
            .or_else(|| self.by_range.get(&(status / 100)))
            .or(self.default.as_ref())
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.by_range.is_empty() && self.default.is_none()
    }
}

/// A compiled operation.
#[derive(Debug)]
pub struct Operation {
    /// HTTP method.
    pub method: Method,
    /// Path template as declared, e.g. `/users/{id}`.
    pub path: String,
    /// Declared `operationId`.
    pub operation_id: Option<String>,
    /// Path-item and operation parameters, merged.
    pub parameters: Vec<Parameter>,
    /// Declared request body.
    pub request_body: Option<RequestBody>,
    /// Declared responses.
    pub responses: Responses,
}

/// Build every operation in the document.
pub fn build_operations(
    document: &OpenAPI,
    compiler: &SchemaCompiler,
) -> Result<Vec<Arc<Operation>>, SetupError> {
    let builder = Builder {
        components: document.components.as_ref(),
        compiler,
    };

    let mut operations = Vec::new();
    for (path, item) in &document.paths.paths {
        if !path.starts_with('/') {
            return Err(SetupError::InvalidDocument {
                reason: format!("path '{path}' must start with '/'"),
            });
        }
        let item = match item {
            ReferenceOr::Item(item) => item,
            ReferenceOr::Reference { reference } => {
                return Err(SetupError::InvalidDocument {
                    reason: format!("path item '{path}' uses unsupported reference '{reference}'"),
                })
            }
        };
        for (method, op) in methods(item) {
            operations.push(Arc::new(builder.operation(path, method, item, op)?));
        }
    }
    Ok(operations)
}

fn methods(item: &PathItem) -> Vec<(Method, &openapiv3::Operation)> {
    [
        (Method::GET, &item.get),
        (Method::PUT, &item.put),
        (Method::POST, &item.post),
        (Method::DELETE, &item.delete),
        (Method::OPTIONS, &item.options),
        (Method::HEAD, &item.head),
        (Method::PATCH, &item.patch),
        (Method::TRACE, &item.trace),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    .collect()
}

struct Builder<'a> {
    components: Option<&'a Components>,
    compiler: &'a SchemaCompiler,
}

impl<'a> Builder<'a> {
    fn operation(
        &self,
        path: &str,
        method: Method,
        item: &'a PathItem,
        op: &'a openapiv3::Operation,
    ) -> Result<Operation, SetupError> {
        let location = format!("{method} {path}");

        if op.responses.responses.is_empty() && op.responses.default.is_none() {
            return Err(SetupError::InvalidDocument {
                reason: format!("operation {location} declares no responses"),
            });
        }

        // Operation-level parameters override path-level ones on (name, in).
        let mut declared = self.parameters(&op.parameters, &location)?;
        let overridden: HashSet<(String, ParameterLocation)> = declared
            .iter()
            .map(|p| (p.name.clone(), p.location))
            .collect();
        for param in self.parameters(&item.parameters, &format!("path {path}"))? {
            if !overridden.contains(&(param.name.clone(), param.location)) {
                declared.push(param);
            }
        }
        check_template_params(path, &declared, &location)?;

        let request_body = op
            .request_body
            .as_ref()
            .map(|body| self.request_body(body, &location))
            .transpose()?;

        let mut responses = Responses::default();
        for (status, response) in &op.responses.responses {
            let compiled = self.response(response, &format!("{location} response {status}"))?;
            match status {
                StatusCode::Code(code) => {
                    responses.by_code.insert(*code, compiled);
                }
                StatusCode::Range(range) => {
                    responses.by_range.insert(*range, compiled);
                }
            }
        }
        if let Some(default) = &op.responses.default {
            let compiled = self.response(default, &format!("{location} response default"))?;
            responses.default = Some(compiled);
        }

        Ok(Operation {
            method,
            path: path.to_string(),
            operation_id: op.operation_id.clone(),
            parameters: declared,
            request_body,
            responses,
        })
    }

    /// Compile one parameter list, rejecting duplicate `(name, in)` pairs.
    fn parameters(
        &self,
        params: &'a [ReferenceOr<openapiv3::Parameter>],
        location: &str,
    ) -> Result<Vec<Parameter>, SetupError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(params.len());
        for param in params {
            let param = self.parameter(param, location)?;
            if !seen.insert((param.name.clone(), param.location)) {
                return Err(SetupError::InvalidDocument {
                    reason: format!(
                        "{location} declares parameter '{}' in {} twice",
                        param.name, param.location
                    ),
                });
            }
            compiled.push(param);
        }
        Ok(compiled)
    }

    fn parameter(
        &self,
        param: &'a ReferenceOr<openapiv3::Parameter>,
        location: &str,
    ) -> Result<Parameter, SetupError> {
        let param = self.resolve(param, "parameters", |c, name| c.parameters.get(name))?;
        let (data, param_location) = split_parameter(param);
        let name = &data.name;

        if param_location == ParameterLocation::Path && !data.required {
            return Err(SetupError::InvalidDocument {
                reason: format!("path parameter '{name}' of {location} must be required"),
            });
        }

        let default_explode = matches!(
            param_location,
            ParameterLocation::Query | ParameterLocation::Cookie
        );
        let (encoding, schema) =
            self.parameter_schema(&data.format, &format!("{location} parameter {name}"))?;

        Ok(Parameter {
            name: data.name.clone(),
            location: param_location,
            required: data.required,
            explode: data.explode.unwrap_or(default_explode),
            encoding,
            schema,
        })
    }

    fn parameter_schema(
        &self,
        format: &ParameterSchemaOrContent,
        location: &str,
    ) -> Result<(ParameterEncoding, Option<CompiledSchema>), SetupError> {
        match format {
            ParameterSchemaOrContent::Schema(schema) => {
                Ok((ParameterEncoding::Schema, Some(self.schema(schema, location)?)))
            }
            ParameterSchemaOrContent::Content(content) => {
                let schema = content
                    .values()
                    .next()
                    .and_then(|media| media.schema.as_ref())
                    .map(|schema| self.schema(schema, location))
                    .transpose()?;
                Ok((ParameterEncoding::Json, schema))
            }
        }
    }

    fn request_body(
        &self,
        body: &'a ReferenceOr<ApiRequestBody>,
        location: &str,
    ) -> Result<RequestBody, SetupError> {
        let body = self.resolve(body, "requestBodies", |c, name| c.request_bodies.get(name))?;
        Ok(RequestBody {
            required: body.required,
            content: self.content(&body.content, &format!("{location} request body"))?,
        })
    }

    fn response(
        &self,
        response: &'a ReferenceOr<ApiResponse>,
        location: &str,
    ) -> Result<Response, SetupError> {
        let response = self.resolve(response, "responses", |c, name| c.responses.get(name))?;
        let mut headers = Vec::new();
        for (name, header) in &response.headers {
            // Content-Type is described by `content`, never by `headers`.
            if name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            headers.push(self.header(name, header, location)?);
        }
        Ok(Response {
            headers,
            content: self.content(&response.content, location)?,
        })
    }

    fn header(
        &self,
        name: &str,
        header: &'a ReferenceOr<Header>,
        location: &str,
    ) -> Result<ResponseHeader, SetupError> {
        let header: &Header = self.resolve(header, "headers", |c, name| c.headers.get(name))?;
        let (_, schema) =
            self.parameter_schema(&header.format, &format!("{location} header {name}"))?;
        Ok(ResponseHeader {
            name: name.to_ascii_lowercase(),
            required: header.required,
            schema,
        })
    }

    fn content(
        &self,
        content: &'a openapiv3::Content,
        location: &str,
    ) -> Result<Vec<MediaEntry>, SetupError> {
        content
            .iter()
            .map(|(media_type, media)| {
                let schema = media
                    .schema
                    .as_ref()
                    .map(|schema| self.schema(schema, &format!("{location} {media_type}")))
                    .transpose()?;
                Ok(MediaEntry {
                    media_type: media_type.to_ascii_lowercase(),
                    schema,
                })
            })
            .collect()
    }

    fn schema(
        &self,
        schema: &ReferenceOr<openapiv3::Schema>,
        location: &str,
    ) -> Result<CompiledSchema, SetupError> {
        let value: Value = serde_json::to_value(schema).map_err(|e| SetupError::Compile {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        self.compiler.compile(&value, location)
    }

    /// Follow `#/components/<section>/<name>` references to an item.
    fn resolve<T>(
        &self,
        item: &'a ReferenceOr<T>,
        section: &str,
        lookup: impl Fn(&'a Components, &str) -> Option<&'a ReferenceOr<T>>,
    ) -> Result<&'a T, SetupError> {
        let prefix = format!("#/components/{section}/");
        let mut current = item;
        for _ in 0..MAX_REF_DEPTH {
            match current {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    let unresolved = |reason: &str| SetupError::UnresolvedReference {
                        reference: reference.clone(),
                        reason: reason.to_string(),
                    };
                    let name = reference
                        .strip_prefix(&prefix)
                        .ok_or_else(|| unresolved(&format!("expected a reference into {prefix}")))?;
                    current = self
                        .components
                        .and_then(|c| lookup(c, name))
                        .ok_or_else(|| unresolved("target does not exist"))?;
                }
            }
        }
        Err(SetupError::UnresolvedReference {
            reference: format!("{prefix}..."),
            reason: format!("reference chain exceeds {MAX_REF_DEPTH} hops"),
        })
    }
}

fn split_parameter(param: &openapiv3::Parameter) -> (&ParameterData, ParameterLocation) {
    match param {
        openapiv3::Parameter::Query { parameter_data, .. } => {
            (parameter_data, ParameterLocation::Query)
        }
        openapiv3::Parameter::Header { parameter_data, .. } => {
            (parameter_data, ParameterLocation::Header)
        }
        openapiv3::Parameter::Path { parameter_data, .. } => {
            (parameter_data, ParameterLocation::Path)
        }
        openapiv3::Parameter::Cookie { parameter_data, .. } => {
            (parameter_data, ParameterLocation::Cookie)
        }
    }
}

/// Every `{name}` in the template must be a declared path parameter.
fn check_template_params(
    path: &str,
    params: &[Parameter],
    location: &str,
) -> Result<(), SetupError> {
    for name in template_names(path) {
        let declared = params
            .iter()
            .any(|p| p.location == ParameterLocation::Path && p.name == name);
        if !declared {
            return Err(SetupError::InvalidDocument {
                reason: format!("operation {location} does not declare path parameter '{name}'"),
            });
        }
    }
    Ok(())
}

/// Names of `{...}` placeholders in a path template.
pub(crate) fn template_names(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        match rest[open..].find('}') {
            Some(close) => {
                names.push(&rest[open + 1..open + close]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    names
}

/// Split a `Content-Type` value into its lowercase essence (`type/subtype`).
pub fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn find_media<'e>(content: &'e [MediaEntry], content_type: &str) -> Option<&'e MediaEntry> {
    let essence = media_essence(content_type);
    let wildcard = essence
        .split_once('/')
        .map(|(main, _)| format!("{main}/*"))
        .unwrap_or_default();
    content
        .iter()
        .find(|m| m.media_type == essence)
        .or_else(|| content.iter().find(|m| m.media_type == wildcard))
        .or_else(|| content.iter().find(|m| m.media_type == "*/*"))
}
