//! # Reference Resolution
//!
//! OpenAPI documents reference shared definitions with `$ref`. Two kinds
//! are handled here:
//!
//! - **Local** refs (`#/components/schemas/User`) stay in place. They are
//!   checked once at load time and resolved on demand with
//!   [`resolve_pointer`].
//! - **External** refs (`common.yaml#/User`) are inlined at load time
//!   by [`bundle`]. Files are read relative to the referencing document.
//!   Local refs inside an external file point into that file, so they are
//!   inlined as well.
//!
//! After bundling, every remaining `$ref` is local, which lets the schema
//! compiler resolve everything without touching the filesystem or network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::SetupError;

/// Maximum number of `$ref` hops followed before declaring a cycle.
pub const MAX_REF_DEPTH: usize = 32;

const REF_KEY: &str = "$ref";

/// Parse YAML (or JSON, which is a YAML subset) into a JSON value tree.
pub fn parse_document(bytes: &[u8]) -> Result<Value, SetupError> {
    let yaml: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(|e| SetupError::Parse {
        reason: e.to_string(),
    })?;
    yaml_to_json_value(&yaml).map_err(|reason| SetupError::Parse { reason })
}

/// Convert a `serde_yaml::Value` to a `serde_json::Value`.
///
/// OpenAPI documents routinely use unquoted status codes (`200:`) as map
/// keys, so numeric and boolean keys are stringified.
fn yaml_to_json_value(yaml: &serde_yaml::Value) -> Result<Value, String> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(serde_json::Number::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Number(serde_json::Number::from(u)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot represent float {f} in JSON"))
            } else {
                Err(format!("unsupported YAML number: {n:?}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(seq) => {
            let items: Result<Vec<Value>, String> = seq.iter().map(yaml_to_json_value).collect();
            Ok(Value::Array(items?))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut json_map = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported YAML map key type: {other:?}")),
                };
                json_map.insert(key, yaml_to_json_value(v)?);
            }
            Ok(Value::Object(json_map))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json_value(&tagged.value),
    }
}

/// Resolve a local reference (`#/a/b`) against a document.
///
/// The fragment is percent-decoded before the JSON pointer lookup, so
/// `#/paths/~1users~1%7Bid%7D` works as written in documents.
pub fn resolve_pointer<'a>(doc: &'a Value, reference: &str) -> Option<&'a Value> {
    let fragment = reference.strip_prefix('#')?;
    if fragment.is_empty() {
        return Some(doc);
    }
    let decoded = percent_decode_str(fragment).decode_utf8().ok()?;
    doc.pointer(&decoded)
}

/// Follow a chain of local refs until a non-reference value is reached.
pub fn deref<'a>(doc: &'a Value, value: &'a Value) -> Result<&'a Value, SetupError> {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        match ref_of(current) {
            Some(reference) => {
                current = resolve_pointer(doc, reference).ok_or_else(|| {
                    SetupError::UnresolvedReference {
                        reference: reference.to_string(),
                        reason: "target does not exist".to_string(),
                    }
                })?;
            }
            None => return Ok(current),
        }
    }
    Err(SetupError::UnresolvedReference {
        reference: ref_of(current).unwrap_or_default().to_string(),
        reason: format!("reference chain exceeds {MAX_REF_DEPTH} hops"),
    })
}

fn ref_of(value: &Value) -> Option<&str> {
    value.get(REF_KEY).and_then(Value::as_str)
}

/// Verify that every local `$ref` in the document points at something.
pub fn check_local_refs(doc: &Value) -> Result<(), SetupError> {
    fn walk(doc: &Value, value: &Value) -> Result<(), SetupError> {
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get(REF_KEY).and_then(Value::as_str) {
                    if reference.starts_with('#') && resolve_pointer(doc, reference).is_none() {
                        return Err(SetupError::UnresolvedReference {
                            reference: reference.to_string(),
                            reason: "target does not exist".to_string(),
                        });
                    }
                }
                map.values().try_for_each(|v| walk(doc, v))
            }
            Value::Array(items) => items.iter().try_for_each(|v| walk(doc, v)),
            _ => Ok(()),
        }
    }
    walk(doc, doc)
}

/// Inline every external reference in `doc`.
///
/// `base_dir` is the directory the document was loaded from; for
/// in-memory documents, the process working directory.
pub fn bundle(doc: &mut Value, base_dir: &Path) -> Result<(), SetupError> {
    let mut bundler = Bundler {
        cache: HashMap::new(),
    };
    bundler.inline(doc, base_dir, None, 0)
}

struct Bundler {
    cache: HashMap<PathBuf, Arc<Value>>,
}

impl Bundler {
    /// Walk `value`, replacing refs that must be inlined.
    ///
    /// `current` is the external document `value` came from, or `None` for
    /// the root document, whose local refs are left untouched.
    fn inline(
        &mut self,
        value: &mut Value,
        base_dir: &Path,
        current: Option<&Arc<Value>>,
        depth: usize,
    ) -> Result<(), SetupError> {
        if let Some(reference) = ref_of(value).map(str::to_string) {
            let (file, fragment) = split_reference(&reference);

            let replacement = if !file.is_empty() {
                let path = base_dir.join(file);
                let external = self.load(&path)?;
                let target = resolve_pointer(&external, &format!("#{fragment}"))
                    .ok_or_else(|| SetupError::UnresolvedReference {
                        reference: reference.clone(),
                        reason: "target does not exist".to_string(),
                    })?
                    .clone();
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                Some((target, dir, external))
            } else if let Some(doc) = current {
                let target = resolve_pointer(doc, &reference)
                    .ok_or_else(|| SetupError::UnresolvedReference {
                        reference: reference.clone(),
                        reason: "target does not exist".to_string(),
                    })?
                    .clone();
                Some((target, base_dir.to_path_buf(), Arc::clone(doc)))
            } else {
                None
            };

            if let Some((mut target, dir, source)) = replacement {
                if depth >= MAX_REF_DEPTH {
                    return Err(SetupError::UnresolvedReference {
                        reference,
                        reason: format!("reference chain exceeds {MAX_REF_DEPTH} hops"),
                    });
                }
                self.inline(&mut target, &dir, Some(&source), depth + 1)?;
                *value = target;
                return Ok(());
            }
        }

        match value {
            Value::Object(map) => {
                for child in map.values_mut() {
                    self.inline(child, base_dir, current, depth)?;
                }
            }
            Value::Array(items) => {
                for child in items.iter_mut() {
                    self.inline(child, base_dir, current, depth)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<Arc<Value>, SetupError> {
        if let Some(doc) = self.cache.get(path) {
            return Ok(Arc::clone(doc));
        }
        let bytes = std::fs::read(path).map_err(|source| SetupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Arc::new(parse_document(&bytes)?);
        self.cache.insert(path.to_path_buf(), Arc::clone(&doc));
        Ok(doc)
    }
}

/// Split `file.yaml#/a/b` into `("file.yaml", "/a/b")`.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once('#') {
        Some((file, fragment)) => (file, fragment),
        None => (reference, ""),
    }
}
