//! # Middleware Module
//!
//! Transport-level hooks that run for every request, before route matching
//! and after the response is built. Route-specific concerns live in
//! [`stages`](crate::stages) instead.
//!
//! ## Built-in Middleware
//!
//! - [`RequestLogger`] - request id, incoming/outgoing log lines with latency
//! - [`LenientAuth`] - best-effort bearer token pass, never rejects
//!
//! The [`ErrorReporter`] is the terminal collaborator that turns a failed
//! pipeline into a response; [`JsonErrorReporter`] is the default.

mod auth;
mod core;
mod error;
mod tracing;

pub use self::auth::LenientAuth;
pub use self::core::Middleware;
pub use self::error::{ErrorReporter, JsonErrorReporter};
pub use self::tracing::RequestLogger;
