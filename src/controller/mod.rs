//! # Controller Module
//!
//! Controllers group related routes under one mount prefix. Each controller
//! declares its routes once, at startup, through a [`RouteRegistry`]:
//!
//! ```rust
//! use serde_json::json;
//! use stagehand::controller::{Controller, RouteRegistry, Services};
//! use stagehand::schema::Descriptor;
//!
//! struct Users;
//!
//! impl Controller for Users {
//!     fn name(&self) -> &str {
//!         "users"
//!     }
//!
//!     fn register(&self, routes: &mut RouteRegistry, services: &Services) {
//!         routes
//!             .post("/", "create_user")
//!             .stage(services.auth())
//!             .body([
//!                 ("email", Descriptor::email()),
//!                 ("age", Descriptor::optional(Descriptor::number())),
//!             ])
//!             .stage(services.transaction())
//!             .handle(|ctx| {
//!                 let email = ctx.ensure_body()?["email"].clone();
//!                 ctx.response_mut().send_json(201, json!({ "email": email }));
//!                 Ok(())
//!             });
//!     }
//! }
//! ```
//!
//! Stages run in the order they are chained: above, auth runs first, then body
//! validation, then the transaction wraps the handler.

use http::Method;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::database::ConnectionPool;
use crate::errors::PipelineError;
use crate::schema::Descriptor;
use crate::security::TokenVerifier;
use crate::stages::{AuthStage, Handler, ParamsStage, Pipeline, Stage, TransactionStage};


/// One declared route: verb, path relative to the controller, handler name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub method: Method,
    pub path: String,
    pub handler_name: String,
}

/// A route definition with its composed pipeline.
#[derive(Debug, Clone)]
pub struct Route {
    pub definition: RouteDefinition,
    pub pipeline: Pipeline,
}

/// A group of routes mounted under `/<name>`; `root` mounts at `/`.
pub trait Controller: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, routes: &mut RouteRegistry, services: &Services);
}

/// Process-wide collaborators handed to controllers while they register.
#[derive(Clone)]
pub struct Services {
    verifier: Arc<dyn TokenVerifier>,
    pool: Arc<dyn ConnectionPool>,
}

impl Services {
    pub fn new(verifier: Arc<dyn TokenVerifier>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self { verifier, pool }
    }

    pub fn verifier(&self) -> Arc<dyn TokenVerifier> {
        Arc::clone(&self.verifier)
    }

    pub fn pool(&self) -> Arc<dyn ConnectionPool> {
        Arc::clone(&self.pool)
    }

    /// Strict auth stage over the shared verifier.
    pub fn auth(&self) -> AuthStage {
        AuthStage::new(self.verifier())
    }

    /// Transaction stage over the shared pool.
    pub fn transaction(&self) -> TransactionStage {
        TransactionStage::new(self.pool())
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Routes declared by one controller, in declaration order.
///
/// Duplicates are recorded as declared; [`App::mount`](crate::app::App::mount)
/// rejects them.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<Route>,
}

impl RouteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, method: Method, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        RouteBuilder {
            registry: self,
            definition: RouteDefinition {
                method,
                path: path.to_string(),
                handler_name: handler_name.to_string(),
            },
            stages: Vec::new(),
        }
    }

    pub fn get(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::GET, path, handler_name)
    }

    pub fn post(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::POST, path, handler_name)
    }

    pub fn put(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::PUT, path, handler_name)
    }

    pub fn delete(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::DELETE, path, handler_name)
    }

    pub fn patch(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::PATCH, path, handler_name)
    }

    pub fn options(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::OPTIONS, path, handler_name)
    }

    pub fn head(&mut self, path: &str, handler_name: &str) -> RouteBuilder<'_> {
        self.route(Method::HEAD, path, handler_name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.iter().map(|r| &r.definition)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_routes(self) -> Vec<Route> {
        self.routes
    }
}

/// Declares one route. Nothing is registered until a handler is attached.
#[must_use = "a route is only registered once `handle` is called"]
pub struct RouteBuilder<'r> {
    registry: &'r mut RouteRegistry,
    definition: RouteDefinition,
    stages: Vec<Arc<dyn Stage>>,
}

impl RouteBuilder<'_> {
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate body fields, in the given order.
    pub fn body<I, K>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        self.stage(ParamsStage::body(fields))
    }

    /// Validate query fields, in the given order.
    pub fn query<I, K>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        self.stage(ParamsStage::query(fields))
    }

    pub fn handle<F>(self, handler: F)
    where
        F: Fn(&mut Context) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        self.handle_with(Arc::new(handler));
    }

    pub fn handle_with(self, handler: Arc<dyn Handler>) {
        let RouteBuilder {
            registry,
            definition,
            stages,
        } = self;
        registry.routes.push(Route {
            definition,
            pipeline: Pipeline::new(stages, handler),
        });
    }
}
