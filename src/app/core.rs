use http::Method;
use may::coroutine::{self, JoinHandle};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::path::PathPattern;
use crate::config::{AppConfig, DEFAULT_STACK_SIZE};
use crate::context::Context;
use crate::controller::{Controller, RouteDefinition, RouteRegistry, Services};
use crate::database::{ConnectionFactory, SessionPool};
use crate::errors::{PipelineError, RegistryError};
use crate::middleware::{ErrorReporter, JsonErrorReporter, LenientAuth, Middleware, RequestLogger};
use crate::security::JwtKeys;
use crate::server::{RawRequest, RawResponse};
use crate::stages::Pipeline;

struct MountedRoute {
    controller: String,
    definition: RouteDefinition,
    pattern: PathPattern,
    pipeline: Pipeline,
}

/// Transport adapter: owns the mounted routes and turns one raw request into
/// one raw response.
///
/// Middleware order is the request logger, then any user middleware in the
/// order added, then the lenient auth pass.
pub struct App {
    services: Services,
    routes: Vec<MountedRoute>,
    // Request logger first, lenient auth last.
    middlewares: Vec<Arc<dyn Middleware>>,
    reporter: Arc<dyn ErrorReporter>,
    stack_size: usize,
}

impl App {
    pub fn new(services: Services) -> Self {
        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(RequestLogger),
            Arc::new(LenientAuth::new(services.verifier())),
        ];
        Self {
            services,
            routes: Vec::new(),
            middlewares,
            reporter: Arc::new(JsonErrorReporter),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Build the token keys and the connection pool from configuration.
    pub fn from_config(
        config: &AppConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let keys = Arc::new(JwtKeys::new(&config.jwt));
        let pool = Arc::new(SessionPool::new(factory, &config.database));
        Ok(Self::new(Services::new(keys, pool)).with_stack_size(config.runtime.stack_size))
    }

    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        let at = self.middlewares.len() - 1;
        self.middlewares.insert(at, middleware);
        self
    }

    #[must_use]
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Register a controller's routes under `/<name>` (`root` → `/`).
    ///
    /// Fails if the controller declares the same verb and path twice or a
    /// path does not compile. Nothing is mounted on failure.
    pub fn mount(&mut self, controller: &dyn Controller) -> Result<(), RegistryError> {
        let name = controller.name();
        let prefix = if name == "root" {
            String::new()
        } else {
            format!("/{name}")
        };

        let mut registry = RouteRegistry::new();
        controller.register(&mut registry, &self.services);

        let mut seen = HashSet::new();
        let mut mounted = Vec::with_capacity(registry.len());
        for route in registry.into_routes() {
            let pattern = PathPattern::compile(&prefix, &route.definition.path)?;
            if !seen.insert((route.definition.method.clone(), pattern.shape().to_string())) {
                return Err(RegistryError::DuplicateRoute {
                    controller: name.to_string(),
                    method: route.definition.method,
                    path: route.definition.path,
                });
            }
            mounted.push(MountedRoute {
                controller: name.to_string(),
                definition: route.definition,
                pattern,
                pipeline: route.pipeline,
            });
        }

        info!(
            controller = %name,
            mount_path = if prefix.is_empty() { "/" } else { prefix.as_str() },
            routes_count = mounted.len(),
            "Controller mounted"
        );
        self.routes.extend(mounted);
        Ok(())
    }

    /// `(method, full path, handler name)` for every mounted route.
    #[must_use]
    pub fn route_table(&self) -> Vec<(Method, String, String)> {
        self.routes
            .iter()
            .map(|r| {
                (
                    r.definition.method.clone(),
                    r.pattern.as_str().to_string(),
                    r.definition.handler_name.clone(),
                )
            })
            .collect()
    }

    /// Process one request to completion on the calling coroutine.
    pub fn handle(&self, mut req: RawRequest) -> RawResponse {
        let start = Instant::now();

        let mut early = None;
        for mw in &self.middlewares {
            if let Some(res) = mw.before(&mut req) {
                early = Some(res);
                break;
            }
        }

        let (req, mut res) = match early {
            Some(res) => (Arc::new(req), res),
            None => self.dispatch(req),
        };

        let latency = start.elapsed();
        for mw in self.middlewares.iter().rev() {
            mw.after(&req, &mut res, latency);
        }
        res
    }

    /// Process one request in its own coroutine.
    pub fn spawn(self: &Arc<Self>, req: RawRequest) -> io::Result<JoinHandle<RawResponse>> {
        let app = Arc::clone(self);
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure owns everything it touches (Arc<App> is Send + Sync, RawRequest
        // is moved in), and failures are turned into responses rather than panics.
        unsafe {
            coroutine::Builder::new()
                .stack_size(self.stack_size)
                .spawn(move || app.handle(req))
        }
    }

    fn dispatch(&self, mut req: RawRequest) -> (Arc<RawRequest>, RawResponse) {
        if let Some(detail) = req.body_error.as_deref() {
            debug!(request_id = %req.request_id, error = %detail, "Rejecting malformed JSON body");
            let req = Arc::new(req);
            let res = self.reporter.report(&req, &PipelineError::MalformedBody);
            return (req, res);
        }

        let Some(route) = self.match_route(&mut req) else {
            warn!(method = %req.method, path = %req.path, "No route matched");
            let err = PipelineError::NotFound(format!("Cannot {} {}", req.method, req.path));
            let req = Arc::new(req);
            let res = self.reporter.report(&req, &err);
            return (req, res);
        };

        debug!(
            request_id = %req.request_id,
            controller = %route.controller,
            handler_name = %route.definition.handler_name,
            path_params = ?req.path_params,
            "Route matched"
        );

        let req = Arc::new(req);
        let outcome = self
            .initial_context(&req)
            .and_then(|ctx| route.pipeline.execute(ctx));
        let res = match outcome {
            Ok(ctx) => ctx.into_response(),
            Err(e) => self.reporter.report(&req, &e),
        };
        (req, res)
    }

    fn initial_context(&self, req: &Arc<RawRequest>) -> Result<Context, PipelineError> {
        let ctx = Context::from_shared(Arc::clone(req));
        match req.claims.clone() {
            Some(claims) => ctx.with_token(claims),
            None => Ok(ctx),
        }
    }

    fn match_route(&self, req: &mut RawRequest) -> Option<&MountedRoute> {
        self.routes.iter().find_map(|route| {
            if route.definition.method != req.method {
                return None;
            }
            let params = route.pattern.matches(&req.path)?;
            req.path_params = params;
            Some(route)
        })
    }
}
