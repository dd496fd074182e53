//! # App Module
//!
//! The transport adapter. An [`App`] mounts controllers, matches each raw
//! request to a route, runs the transport middleware, executes the route's
//! pipeline and hands any failure to the error reporter.
//!
//! Route patterns use `:name` segments (`/users/:id`); the captured values are
//! available to stages and handlers through
//! [`Context::path_param`](crate::context::Context::path_param).
//!
//! The HTTP server itself is not part of this crate: the embedding server
//! builds a [`RawRequest`](crate::server::RawRequest) and calls
//! [`App::handle`], or [`App::spawn`] to run it in its own coroutine.

mod core;
mod path;

pub use self::core::App;
pub use self::path::PathPattern;
