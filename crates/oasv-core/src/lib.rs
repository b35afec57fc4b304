//! # oasv-core — Foundational Types for OpenAPI Validation
//!
//! This crate is the leaf of the oasv dependency graph. It defines the
//! vocabulary shared by the schema layer and the HTTP layer: what a raw
//! validation failure looks like, how a tree of failures is flattened into
//! a stable client-facing report, and which options steer validation.
//!
//! ## Key Design Principles
//!
//! 1. **Closed issue taxonomy.** [`ValidationIssue`] is a sum type over the
//!    five failure shapes the validators can produce. The converter matches
//!    exhaustively, so adding a variant forces every consumer to decide how
//!    to key and render it.
//!
//! 2. **Deterministic output.** [`convert`] buckets messages under
//!    field/location keys in a `BTreeMap`, so the flattened message order
//!    is a pure function of the keys and never of discovery order.
//!
//! 3. **Explicit options.** [`ValidationOptions`] is an immutable `Copy`
//!    value built once per middleware or handler. There are no global
//!    defaults to mutate.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `oasv-*` crates.
//! - No HTTP framework types; status codes are plain `u16`.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod convert;
pub mod issue;
pub mod options;
pub mod report;

pub use convert::{convert, flatten, IssueBuckets, BODY_KEY, RESPONSE_KEY, UNKNOWN_KEY};
pub use issue::{
    BodyCause, BodyIssue, ParameterIssue, ParameterLocation, ResponseIssue, SchemaIssue,
    ValidationErrors, ValidationIssue,
};
pub use options::ValidationOptions;
pub use report::ErrorReport;
