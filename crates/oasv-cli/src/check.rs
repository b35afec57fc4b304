//! # Check Subcommand
//!
//! Loads a document through the full setup path (parse, bundle, structural
//! checks, compile, route table) and lists the routes it declares.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use oasv_schema::{load, Router, SchemaSource};

/// Arguments for the check subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// OpenAPI document (YAML or JSON).
    pub schema: PathBuf,
}

/// Load the document and print one line per operation.
pub fn run_check(args: &CheckArgs) -> anyhow::Result<u8> {
    let (schema, router) = load(&SchemaSource::Path(args.schema.clone()))
        .with_context(|| format!("failed to load {}", args.schema.display()))?;

    tracing::info!(title = %schema.title(), version = %schema.version(), "document is valid");
    for line in describe_routes(&router) {
        println!("{line}");
    }
    Ok(0)
}

/// `METHOD path (operationId)` for every route, sorted by path then method.
pub fn describe_routes(router: &Router) -> Vec<String> {
    let mut operations: Vec<_> = router.operations().collect();
    operations.sort_by(|a, b| (&a.path, a.method.as_str()).cmp(&(&b.path, b.method.as_str())));
    operations
        .into_iter()
        .map(|op| match &op.operation_id {
            Some(id) => format!("{} {} ({id})", op.method, op.path),
            None => format!("{} {}", op.method, op.path),
        })
        .collect()
}
