//! # Stages Module
//!
//! Stages are the cross-cutting links composed around a route handler.
//! A [`Pipeline`] runs them in declaration order: the first-declared stage is
//! the outermost, sees the request first, and wraps everything after it.
//!
//! ## Built-in Stages
//!
//! - [`AuthStage`] - bearer token check, attaches claims
//! - [`ParamsStage`] - body or query validation against descriptors
//! - [`TransactionStage`] - one database transaction around the rest of the chain
//!
//! Custom stages implement [`Stage`] or wrap a closure with [`from_fn`].
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use stagehand::context::Context;
//! use stagehand::errors::PipelineError;
//! use stagehand::schema::Descriptor;
//! use stagehand::server::RawRequest;
//! use stagehand::stages::{Handler, ParamsStage, Pipeline, Stage};
//! use serde_json::json;
//!
//! let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(ParamsStage::body([
//!     ("email", Descriptor::email()),
//!     ("age", Descriptor::optional(Descriptor::number())),
//! ]))];
//! let handler: Arc<dyn Handler> = Arc::new(|ctx: &mut Context| -> Result<(), PipelineError> {
//!     let email = ctx.ensure_body()?["email"].clone();
//!     ctx.response_mut().send_json(201, json!({ "email": email }));
//!     Ok(())
//! });
//! let pipeline = Pipeline::new(stages, handler);
//!
//! let req = RawRequest::new(Method::POST, "/users")
//!     .with_json_body(json!({ "email": "a@b.com", "admin": true }));
//! let ctx = pipeline.execute(Context::new(req)).unwrap();
//! assert_eq!(ctx.body().unwrap().len(), 1);
//! assert_eq!(ctx.response().status, 201);
//! ```

mod auth;
mod core;
mod params;
#[cfg(test)]
mod tests;
mod transaction;

pub use self::auth::AuthStage;
pub use self::core::{from_fn, Handler, Next, Pipeline, Stage};
pub use self::params::{ParamsStage, Source};
pub use self::transaction::TransactionStage;
