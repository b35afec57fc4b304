//! # oasv-schema — OpenAPI Document Model and Validators
//!
//! Loads an OpenAPI 3.0 document, compiles every schema it declares, and
//! validates requests and responses against it.
//!
//! ## Architecture
//!
//! - **Loading** ([`loader`]): parse, bundle external refs, structural
//!   checks, compile. Every failure is a [`SetupError`] at construction.
//! - **Routing** ([`router`]): `(method, path)` to compiled [`Operation`].
//! - **Validation** ([`request`], [`response`]): collect
//!   [`oasv_core::ValidationIssue`]s for one request or response.
//!
//! The loaded schema and router are immutable and shared through `Arc`;
//! per-request work allocates only the issues it reports.

pub mod coerce;
pub mod compile;
pub mod error;
pub mod loader;
pub mod operation;
pub mod refs;
pub mod request;
pub mod response;
pub mod router;

pub use compile::CompiledSchema;
pub use error::{RouteError, SetupError};
pub use loader::{load, Schema, SchemaSource};
pub use operation::Operation;
pub use request::{validate_request, RequestInput};
pub use response::{validate_response, ResponseInput};
pub use router::{MatchedRoute, Router};
