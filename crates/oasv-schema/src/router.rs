//! # Route Resolution
//!
//! Maps `(method, path)` to a compiled [`Operation`].
//!
//! ## Matching Rules
//!
//! - Server URL path prefixes (`servers[].url`) are stripped first. With
//!   no servers declared, paths match from the root.
//! - Segments are compared after percent-decoding.
//! - A literal segment beats a templated one: `/users/me` wins over
//!   `/users/{id}` for `GET /users/me`.
//! - Trailing slashes are significant: `/users/` does not match `/users`.
//! - A path that matches a template without the request method yields
//!   [`RouteError::MethodNotAllowed`] listing the declared methods.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::Method;
use openapiv3::Server;
use percent_encoding::percent_decode_str;

use crate::error::{RouteError, SetupError};
use crate::operation::Operation;

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    /// The matched operation.
    pub operation: Arc<Operation>,
    /// Decoded path parameter values keyed by name.
    pub path_params: BTreeMap<String, String>,
}

impl MatchedRoute {
    /// Path template of the matched operation.
    pub fn template(&self) -> &str {
        &self.operation.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param {
        prefix: String,
        name: String,
        suffix: String,
    },
}

impl Segment {
    fn parse(raw: &str, template: &str) -> Result<Self, SetupError> {
        let Some(open) = raw.find('{') else {
            if raw.contains('}') {
                return Err(invalid_template(template, "unbalanced '}'"));
            }
            return Ok(Segment::Literal(raw.to_string()));
        };
        let close = raw[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid_template(template, "unbalanced '{'"))?;
        let name = &raw[open + 1..close];
        let suffix = &raw[close + 1..];
        if name.is_empty() {
            return Err(invalid_template(template, "empty parameter name"));
        }
        if suffix.contains('{') || suffix.contains('}') {
            return Err(invalid_template(
                template,
                "at most one parameter per segment is supported",
            ));
        }
        Ok(Segment::Param {
            prefix: raw[..open].to_string(),
            name: name.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Shape used to detect templates that can never be told apart.
    fn shape(&self) -> String {
        match self {
            Segment::Literal(s) => s.clone(),
            Segment::Param { prefix, suffix, .. } => format!("{prefix}{{}}{suffix}"),
        }
    }

    fn matches<'s>(&self, segment: &'s str) -> Option<Option<(&str, &'s str)>> {
        match self {
            Segment::Literal(s) => (s == segment).then_some(None),
            Segment::Param {
                prefix,
                name,
                suffix,
            } => {
                let value = segment.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())?;
                (!value.is_empty()).then_some(Some((name.as_str(), value)))
            }
        }
    }
}

fn invalid_template(template: &str, reason: &str) -> SetupError {
    SetupError::Router {
        reason: format!("invalid path template '{template}': {reason}"),
    }
}

#[derive(Debug)]
struct Route {
    template: String,
    segments: Vec<Segment>,
    literals: usize,
    operations: Vec<Arc<Operation>>,
}

impl Route {
    fn operation(&self, method: &Method) -> Option<&Arc<Operation>> {
        self.operations.iter().find(|op| op.method == *method)
    }
}

/// Route table built once from a document's operations.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    /// Server path prefixes, longest first. `""` matches from the root.
    prefixes: Vec<String>,
}

impl Router {
    /// Build a router from compiled operations and server path prefixes.
    pub fn new(operations: Vec<Arc<Operation>>, prefixes: Vec<String>) -> Result<Self, SetupError> {
        let mut routes: Vec<Route> = Vec::new();
        for op in operations {
            if let Some(route) = routes.iter_mut().find(|r| r.template == op.path) {
                route.operations.push(op);
                continue;
            }
            let segments = split_path(&op.path)
                .map(|raw| Segment::parse(raw, &op.path))
                .collect::<Result<Vec<_>, _>>()?;
            let literals = segments
                .iter()
                .filter(|s| matches!(s, Segment::Literal(_)))
                .count();
            routes.push(Route {
                template: op.path.clone(),
                segments,
                literals,
                operations: vec![op],
            });
        }

        for (i, a) in routes.iter().enumerate() {
            for b in &routes[i + 1..] {
                let same_shape = a.segments.len() == b.segments.len()
                    && a.segments.iter().zip(&b.segments).all(|(x, y)| x.shape() == y.shape());
                if same_shape {
                    return Err(SetupError::Router {
                        reason: format!(
                            "path templates '{}' and '{}' are ambiguous",
                            a.template, b.template
                        ),
                    });
                }
            }
        }

        // Stable sort keeps declaration order among equally specific routes.
        routes.sort_by(|a, b| b.literals.cmp(&a.literals));

        let mut prefixes = if prefixes.is_empty() {
            vec![String::new()]
        } else {
            prefixes
        };
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        prefixes.dedup();

        Ok(Self { routes, prefixes })
    }

    /// Every operation in the table.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.routes.iter().flat_map(|r| r.operations.iter())
    }

    /// Resolve a request method and raw (still percent-encoded) path.
    pub fn find_route(&self, method: &Method, path: &str) -> Result<MatchedRoute, RouteError> {
        let mut allowed: Vec<Method> = Vec::new();

        for prefix in &self.prefixes {
            let Some(rest) = strip_server_prefix(path, prefix) else {
                continue;
            };
            let segments = split_path(rest)
                .map(|s| {
                    percent_decode_str(s)
                        .decode_utf8()
                        .map(|d| d.into_owned())
                        .map_err(|e| RouteError::InvalidPath {
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            for route in &self.routes {
                let Some(path_params) = match_segments(&route.segments, &segments) else {
                    continue;
                };
                match route.operation(method) {
                    Some(operation) => {
                        return Ok(MatchedRoute {
                            operation: Arc::clone(operation),
                            path_params,
                        })
                    }
                    None => {
                        for op in &route.operations {
                            if !allowed.contains(&op.method) {
                                allowed.push(op.method.clone());
                            }
                        }
                    }
                }
            }
        }

        if allowed.is_empty() {
            Err(RouteError::PathNotFound)
        } else {
            Err(RouteError::MethodNotAllowed { allowed })
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

fn strip_server_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn match_segments(template: &[Segment], segments: &[String]) -> Option<BTreeMap<String, String>> {
    if template.len() != segments.len() {
        return None;
    }
    let mut params = BTreeMap::new();
    for (pattern, segment) in template.iter().zip(segments) {
        if let Some((name, value)) = pattern.matches(segment)? {
            params.insert(name.to_string(), value.to_string());
        }
    }
    Some(params)
}

/// Path prefixes of the document's `servers` entries.
///
/// Variables are replaced by their defaults; absolute URLs contribute their
/// path component. A server at the root contributes `""`.
pub fn server_prefixes(servers: &[Server]) -> Vec<String> {
    servers
        .iter()
        .map(|server| {
            let mut url = server.url.clone();
            if let Some(variables) = &server.variables {
                for (name, variable) in variables {
                    url = url.replace(&format!("{{{name}}}"), &variable.default);
                }
            }
            let path = if url.starts_with('/') {
                url
            } else if url.contains("://") {
                url::Url::parse(&url)
                    .map(|parsed| parsed.path().to_string())
                    .unwrap_or_default()
            } else {
                format!("/{url}")
            };
            path.trim_end_matches('/').to_string()
        })
        .collect()
}
