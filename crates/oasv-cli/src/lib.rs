//! # oasv-cli — Operator Command-Line Interface
//!
//! Checks OpenAPI documents and validates single requests against them,
//! using the same loader and validators as the middleware.
//!
//! ## Subcommands
//!
//! - `check`: load a document and list its routes
//! - `request`: validate one request and print the client-facing report
//!
//! ## Crate Policy
//!
//! - Argument parsing lives next to each handler; `main` only dispatches.
//! - Handlers return an exit code; setup failures propagate as errors.

pub mod check;
pub mod request;
