//! # Schema Compilation
//!
//! Turns OpenAPI schema objects into compiled `jsonschema` validators and
//! maps validator errors onto [`SchemaIssue`]s with stable reasons.
//!
//! ## Dialect
//!
//! OpenAPI 3.0 schema objects follow JSON Schema Draft 4 (boolean
//! `exclusiveMinimum`/`exclusiveMaximum`), plus the `nullable` keyword.
//! Before compiling, `nullable: true` is rewritten into a `null` type
//! alternative.
//!
//! ## Reference Resolution
//!
//! Each compiled root embeds the document's `components` section, so
//! `#/components/schemas/...` refs resolve against the root itself.
//! External files were already inlined by [`crate::refs::bundle`]; the
//! retriever installed here refuses every remote URI, so compilation never
//! performs network or filesystem IO.

use std::fmt;

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Retrieve, Uri, ValidationError, Validator};
use oasv_core::SchemaIssue;
use serde_json::{json, Map, Value};

use crate::error::SetupError;
use crate::refs;

/// Retriever that refuses every remote reference.
///
/// All references are local once a document has been bundled, so any
/// request for a remote URI means the document is inconsistent.
struct LocalOnlyRetriever;

impl Retrieve for LocalOnlyRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("remote reference '{}' is not allowed", uri.as_str()).into())
    }
}

/// Compiles schema objects from one document.
pub struct SchemaCompiler {
    /// The document's `components` section with `nullable` rewritten.
    components: Value,
    /// The full bundled document, for resolving top-level refs.
    document: Value,
}

impl SchemaCompiler {
    /// Prepare a compiler for a bundled document.
    pub fn new(document: &Value) -> Self {
        let mut components = document
            .get("components")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        rewrite_nullable(&mut components);
        Self {
            components,
            document: document.clone(),
        }
    }

    /// Compile a schema object found at `location` in the document.
    pub fn compile(&self, schema: &Value, location: &str) -> Result<CompiledSchema, SetupError> {
        let mut normalized = schema.clone();
        rewrite_nullable(&mut normalized);

        let root = json!({
            "allOf": [normalized.clone()],
            "components": self.components.clone(),
        });

        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft4);
        opts.with_retriever(LocalOnlyRetriever);

        let validator = opts.build(&root).map_err(|e| SetupError::Compile {
            location: location.to_string(),
            reason: e.to_string(),
        })?;

        let resolved = refs::deref(&self.document, schema)?.clone();
        let items = resolved
            .get("items")
            .map(|items| refs::deref(&self.document, items))
            .transpose()?
            .cloned();

        Ok(CompiledSchema {
            validator,
            schema: normalized,
            resolved,
            items,
        })
    }
}

/// A compiled validator plus the schema it was built from.
pub struct CompiledSchema {
    validator: Validator,
    /// Normalized schema as compiled (may be a `$ref`).
    schema: Value,
    /// The schema with top-level refs followed, for type-driven coercion.
    resolved: Value,
    /// Array item schema with refs followed.
    items: Option<Value>,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

impl CompiledSchema {
    /// The schema with top-level refs resolved.
    pub fn resolved(&self) -> &Value {
        &self.resolved
    }

    /// The declared primitive type, if the schema names one.
    pub fn primitive_type(&self) -> Option<&str> {
        self.resolved.get("type").and_then(Value::as_str)
    }

    /// The declared primitive type of array items, if any.
    pub fn item_type(&self) -> Option<&str> {
        self.items
            .as_ref()
            .and_then(|items| items.get("type"))
            .and_then(Value::as_str)
    }

    /// Returns true if the value satisfies the schema.
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validate an instance, returning every issue found (or only the
    /// first when `multi_error` is false).
    pub fn issues(&self, instance: &Value, multi_error: bool) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        for error in self.validator.iter_errors(instance) {
            issues.extend(issues_from_error(&error));
            if !multi_error && !issues.is_empty() {
                issues.truncate(1);
                break;
            }
        }
        issues
    }

    /// Multi-line diagnostic in the shape `<reason>\nSchema:\n  ...\n\nValue:\n  ...`.
    ///
    /// Used as a parameter cause; clients only ever see the first line.
    pub fn diagnostic(&self, reason: &str, instance: &Value) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        let value = serde_json::to_string_pretty(instance).unwrap_or_default();
        format!(
            "{reason}\nSchema:\n  {}\n\nValue:\n  {}",
            schema.replace('\n', "\n  "),
            value.replace('\n', "\n  ")
        )
    }
}

/// Rewrite `{"type": T, "nullable": true}` into `{"type": [T, "null"]}`
/// throughout a schema tree.
fn rewrite_nullable(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.remove("nullable") == Some(Value::Bool(true)) {
                if let Some(Value::String(ty)) = map.get("type").cloned() {
                    map.insert("type".to_string(), json!([ty, "null"]));
                }
                if let Some(Value::Array(options)) = map.get_mut("enum") {
                    if !options.contains(&Value::Null) {
                        options.push(Value::Null);
                    }
                }
            }
            for child in map.values_mut() {
                rewrite_nullable(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite_nullable),
        _ => {}
    }
}

/// Map one validator error onto schema issues.
///
/// `required` errors point at the missing property itself, and one
/// `additionalProperties` error becomes one issue per unexpected property.
fn issues_from_error(error: &ValidationError<'_>) -> Vec<SchemaIssue> {
    let path = pointer_segments(&error.instance_path.to_string());
    let single = |reason: String| vec![SchemaIssue::new(path.clone(), reason)];

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            let mut field = path.clone();
            field.push(name.clone());
            vec![SchemaIssue::new(field, format!("property \"{name}\" is missing"))]
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|name| {
                SchemaIssue::new(path.clone(), format!("property \"{name}\" is unsupported"))
            })
            .collect(),
        ValidationErrorKind::Type { kind } => single(type_reason(kind)),
        ValidationErrorKind::MinLength { limit } => {
            single(format!("minimum string length is {limit}"))
        }
        ValidationErrorKind::MaxLength { limit } => {
            single(format!("maximum string length is {limit}"))
        }
        ValidationErrorKind::Pattern { pattern } => single(format!(
            "string doesn't match the regular expression \"{pattern}\""
        )),
        ValidationErrorKind::Format { format } => {
            single(format!("string doesn't match the format \"{format}\""))
        }
        ValidationErrorKind::Minimum { limit } => {
            single(format!("number must be at least {}", number_text(limit)))
        }
        ValidationErrorKind::Maximum { limit } => {
            single(format!("number must be at most {}", number_text(limit)))
        }
        ValidationErrorKind::ExclusiveMinimum { limit } => {
            single(format!("number must be more than {}", number_text(limit)))
        }
        ValidationErrorKind::ExclusiveMaximum { limit } => {
            single(format!("number must be less than {}", number_text(limit)))
        }
        ValidationErrorKind::MultipleOf { multiple_of } => single(format!(
            "number must be a multiple of {}",
            number_text(&json!(multiple_of))
        )),
        ValidationErrorKind::Enum { options } => {
            single(format!("value is not one of the allowed values {options}"))
        }
        ValidationErrorKind::MinItems { limit } => {
            single(format!("minimum number of items is {limit}"))
        }
        ValidationErrorKind::MaxItems { limit } => {
            single(format!("maximum number of items is {limit}"))
        }
        ValidationErrorKind::UniqueItems { .. } => single("duplicate items found".to_string()),
        ValidationErrorKind::MinProperties { limit } => {
            single(format!("there must be at least {limit} properties"))
        }
        ValidationErrorKind::MaxProperties { limit } => {
            single(format!("there must be at most {limit} properties"))
        }
        ValidationErrorKind::AnyOf { .. } => {
            single("doesn't match any schema from \"anyOf\"".to_string())
        }
        ValidationErrorKind::OneOfNotValid { .. } => single(
            "doesn't match schema due to: value doesn't match any schema from \"oneOf\"".to_string(),
        ),
        ValidationErrorKind::OneOfMultipleValid { .. } => {
            single("value matches more than one schema from \"oneOf\"".to_string())
        }
        ValidationErrorKind::Not { .. } => {
            single("doesn't match schema due to: \"not\"".to_string())
        }
        _ => single(error.to_string()),
    }
}

/// Render a numeric limit the way it was most likely written: `100`, not `100.0`.
fn number_text(limit: &Value) -> String {
    match limit.as_f64() {
        Some(f) if limit.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => limit.to_string(),
    }
}

fn type_reason(kind: &TypeKind) -> String {
    let expected = match kind {
        TypeKind::Single(ty) => ty.to_string(),
        TypeKind::Multiple(types) => types
            .into_iter()
            .map(|ty| ty.to_string())
            .find(|ty| ty != "null")
            .unwrap_or_else(|| "null".to_string()),
    };
    let article = match expected.as_str() {
        "array" | "integer" | "object" => "an",
        _ => "a",
    };
    format!("value must be {article} {expected}")
}

/// Split a JSON pointer (`/a/b~1c`) into decoded segments.
fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}
