//! # Stagehand
//!
//! **Stagehand** builds per-route request pipelines out of small composable
//! stages, on top of the `may` coroutine runtime.
//!
//! ## Overview
//!
//! Every route declares an ordered list of stages around a handler. A request
//! is matched to its route, an initial [`Context`] is built, and the stages run
//! in declaration order, each one adding fields to the context or failing the
//! request with a typed [`PipelineError`]. The handler runs last and sees
//! everything the stages added.
//!
//! ## Architecture
//!
//! - **[`schema`]** - Type descriptors (`Email`, `Array<UUID>`, `Varchar(1,20)`,
//!   `Optional<Number>`) and the recursive validator
//! - **[`context`]** - The append-only per-request record
//! - **[`stages`]** - The stage trait, the pipeline composer and the built-in
//!   auth, parameter and transaction stages
//! - **[`controller`]** - Controllers and the route registry builder
//! - **[`app`]** - Mounting, path matching, middleware and error reporting
//! - **[`database`]** - Connection pool, transactional sessions and tables
//! - **[`repository`]** - Repositories layered over a bound table
//! - **[`security`]** - Bearer parsing and HS256 tokens
//! - **[`middleware`]** - Transport middleware and the terminal error reporter
//! - **[`config`]** / **[`logging`]** - YAML plus environment configuration,
//!   `tracing` subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Server as Embedding server
//!     participant App
//!     participant MW as Middleware
//!     participant Pipeline
//!     participant Handler
//!
//!     Server->>App: RawRequest
//!     App->>MW: before (request id, lenient auth)
//!     App->>App: match route, build Context
//!     App->>Pipeline: execute(ctx)
//!     Pipeline->>Pipeline: auth -> body/query -> transaction
//!     Pipeline->>Handler: call(&mut ctx)
//!     Handler-->>Pipeline: Ok / PipelineError
//!     Pipeline-->>App: Context or error
//!     App->>App: ErrorReporter on failure
//!     App->>MW: after (status, latency)
//!     App-->>Server: RawResponse
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use stagehand::controller::{Controller, RouteRegistry, Services};
//! use stagehand::schema::Descriptor;
//! use stagehand::server::RawRequest;
//! use stagehand::App;
//! # use stagehand::database::{ConnectionPool, PooledConnection};
//! # use stagehand::errors::DbError;
//! # use stagehand::security::{Claims, TokenVerifier};
//! # use std::sync::Arc;
//! # struct NoTokens;
//! # impl TokenVerifier for NoTokens {
//! #     fn verify(&self, _token: &str) -> Option<Claims> { None }
//! # }
//! # struct NoDb;
//! # impl ConnectionPool for NoDb {
//! #     fn acquire(&self) -> Result<PooledConnection, DbError> { Err(DbError::new("no db")) }
//! # }
//! # let services = Services::new(Arc::new(NoTokens), Arc::new(NoDb));
//!
//! struct Greeter;
//!
//! impl Controller for Greeter {
//!     fn name(&self) -> &str {
//!         "greet"
//!     }
//!
//!     fn register(&self, routes: &mut RouteRegistry, _services: &Services) {
//!         routes
//!             .get("/", "greet")
//!             .query([("name", Descriptor::string())])
//!             .handle(|ctx| {
//!                 let name = ctx.ensure_query()?["name"].clone();
//!                 ctx.response_mut().send_json(200, json!({ "hello": name }));
//!                 Ok(())
//!             });
//!     }
//! }
//!
//! let mut app = App::new(services);
//! app.mount(&Greeter).unwrap();
//! let res = app.handle(RawRequest::new(http::Method::GET, "/greet?name=ada"));
//! assert_eq!(res.body, json!({ "hello": "ada" }));
//! ```
//!
//! ## Runtime Considerations
//!
//! Stagehand uses the `may` coroutine runtime, not tokio. Stages and handlers
//! are written in direct style; waiting for a pooled connection parks the
//! coroutine rather than the thread. The coroutine stack size is set with
//! `STAGEHAND_STACK_SIZE` or `runtime.stack_size` in the YAML configuration.

pub mod app;
pub mod config;
pub mod context;
pub mod controller;
pub mod database;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod schema;
pub mod security;
pub mod server;
pub mod stages;

pub use app::App;
pub use context::{Context, Params};
pub use controller::{Controller, RouteRegistry, Services};
pub use errors::PipelineError;
pub use schema::Descriptor;
pub use stages::{Pipeline, Stage};
