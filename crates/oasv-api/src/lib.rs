//! # oasv-api — Axum Integration
//!
//! Request validation middleware and handler-side response validation for
//! Axum services described by an OpenAPI 3.0 document.
//!
//! ## Request Flow
//!
//! ```text
//! request ─► skipper ─► exemptions ─► route ─► validate ─► handler
//!               │            │          │          │          │
//!               └─ bypass ───┘        404/405    400/422      └─► ResponseValidator ─► 200.. / 500
//! ```
//!
//! - [`openapi_middleware`] rejects requests that do not match the
//!   document and stores a [`ValidationContext`] for the rest.
//! - Handlers extract [`ValidationContexts`] and build their response
//!   through [`ResponseValidator`], which refuses to send a response that
//!   breaks the contract.
//!
//! ## Crate Policy
//!
//! - Setup failures surface from [`OpenApiValidator::with_config`]; a
//!   running service never fails for document reasons.
//! - Client-facing bodies are always `{"message", "errors"?}`. Server-side
//!   contract violations reach clients only as a generic 500.

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;

pub use config::{ExemptRoutes, HandlerConfig, OpenApiConfig, Skipper};
pub use context::{ValidationContext, ValidationContexts};
pub use error::{HandlerError, PipelineError};
pub use handler::ResponseValidator;
pub use middleware::{openapi_middleware, OpenApiValidator};
