//! # Document Loading
//!
//! Turns a schema source into a checked, compiled document and its route
//! table. All failures surface here, at setup, never per request.
//!
//! Loading runs in a fixed order:
//!
//! 1. Read the source (file path or in-memory bytes; bytes win).
//! 2. Parse YAML or JSON into a JSON value tree.
//! 3. Inline external `$ref`s and check that local ones resolve.
//! 4. Deserialize into the OpenAPI 3.0 model and run structural checks.
//! 5. Compile every schema and build the router.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use openapiv3::OpenAPI;
use serde_json::Value;

use crate::compile::SchemaCompiler;
use crate::error::SetupError;
use crate::operation::build_operations;
use crate::refs;
use crate::router::{server_prefixes, Router};

/// Supported `openapi` version prefix.
pub const SUPPORTED_VERSION: &str = "3.0";

/// Where the OpenAPI document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// A YAML or JSON file on disk.
    Path(PathBuf),
    /// An in-memory YAML or JSON document.
    Bytes(Vec<u8>),
}

impl SchemaSource {
    /// Pick a source from optional settings. Bytes take precedence over
    /// a path; an empty path counts as unset.
    pub fn select(path: Option<&Path>, bytes: Option<&[u8]>) -> Result<Self, SetupError> {
        match (bytes, path) {
            (Some(bytes), _) if !bytes.is_empty() => Ok(Self::Bytes(bytes.to_vec())),
            (_, Some(path)) if !path.as_os_str().is_empty() => Ok(Self::Path(path.to_path_buf())),
            _ => Err(SetupError::MissingSource),
        }
    }

    fn read(&self) -> Result<(Vec<u8>, PathBuf), SetupError> {
        match self {
            Self::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| SetupError::Io {
                    path: path.clone(),
                    source,
                })?;
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok((bytes, base))
            }
            Self::Bytes(bytes) => {
                let base = std::env::current_dir().unwrap_or_default();
                Ok((bytes.clone(), base))
            }
        }
    }
}

/// A loaded, checked OpenAPI document.
#[derive(Debug)]
pub struct Schema {
    document: OpenAPI,
    raw: Value,
}

impl Schema {
    /// The typed document model.
    pub fn document(&self) -> &OpenAPI {
        &self.document
    }

    /// The bundled document as a JSON tree.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Declared `openapi` version.
    pub fn version(&self) -> &str {
        &self.document.openapi
    }

    /// Declared `info.title`.
    pub fn title(&self) -> &str {
        &self.document.info.title
    }
}

/// Load, check, and compile a document, then build its router.
pub fn load(source: &SchemaSource) -> Result<(Arc<Schema>, Arc<Router>), SetupError> {
    let (bytes, base_dir) = source.read()?;

    let mut raw = refs::parse_document(&bytes)?;
    refs::bundle(&mut raw, &base_dir)?;
    refs::check_local_refs(&raw)?;

    let document: OpenAPI =
        serde_json::from_value(raw.clone()).map_err(|e| SetupError::InvalidDocument {
            reason: e.to_string(),
        })?;
    if !document.openapi.starts_with(SUPPORTED_VERSION) {
        return Err(SetupError::InvalidDocument {
            reason: format!(
                "unsupported openapi version '{}', expected {SUPPORTED_VERSION}.x",
                document.openapi
            ),
        });
    }

    let compiler = SchemaCompiler::new(&raw);
    let operations = build_operations(&document, &compiler)?;
    let operation_count = operations.len();
    let router = Router::new(operations, server_prefixes(&document.servers))?;

    tracing::debug!(
        title = %document.info.title,
        version = %document.openapi,
        operations = operation_count,
        "loaded OpenAPI document"
    );

    Ok((Arc::new(Schema { document, raw }), Arc::new(router)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_bytes() {
        let bytes = b"openapi: 3.0.0".as_slice();
        let source = SchemaSource::select(Some(Path::new("a.yaml")), Some(bytes)).unwrap();
        assert!(matches!(source, SchemaSource::Bytes(_)));
    }

    #[test]
    fn test_select_falls_back_to_path() {
        let source = SchemaSource::select(Some(Path::new("a.yaml")), Some(&b""[..])).unwrap();
        assert_eq!(source, SchemaSource::Path(PathBuf::from("a.yaml")));
    }

    #[test]
    fn test_select_requires_something() {
        assert!(matches!(
            SchemaSource::select(Some(Path::new("")), None),
            Err(SetupError::MissingSource)
        ));
        assert!(matches!(
            SchemaSource::select(None, None),
            Err(SetupError::MissingSource)
        ));
    }
}
