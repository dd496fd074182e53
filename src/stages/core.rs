use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Context;
use crate::errors::PipelineError;

/// One link in a route's pipeline.
///
/// A stage receives the context by value, may add to it, and either hands the
/// result to `next` or fails. Whatever `next` returns (the context after the
/// handler ran, or the first failure) is what the stage returns, so a stage
/// can act on the outcome of everything after it.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: Context, next: Next<'_>) -> Result<Context, PipelineError>;
}

/// A route's handler body. Runs after every declared stage.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: &mut Context) -> Result<(), PipelineError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> Result<(), PipelineError> + Send + Sync,
{
    fn call(&self, ctx: &mut Context) -> Result<(), PipelineError> {
        self(ctx)
    }
}

/// The rest of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn run(self, mut ctx: Context) -> Result<Context, PipelineError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                debug!(stage = stage.name(), "Stage start");
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                let result = stage.run(ctx, next);
                if let Err(e) = &result {
                    debug!(stage = stage.name(), kind = e.kind(), "Stage failed");
                }
                result
            }
            None => {
                self.handler.call(&mut ctx)?;
                Ok(ctx)
            }
        }
    }

    /// Stages still to run, excluding the handler.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

/// Stages composed around a handler, first-declared outermost.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>, handler: Arc<dyn Handler>) -> Self {
        Self { stages, handler }
    }

    /// Run every stage in declaration order, then the handler.
    pub fn execute(&self, ctx: Context) -> Result<Context, PipelineError> {
        let next = Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        };
        next.run(ctx).inspect_err(|e| {
            if e.status() >= 500 {
                warn!(kind = e.kind(), error = %e, "Pipeline failed");
            }
        })
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> Stage for FnStage<F>
where
    F: Fn(Context, Next<'_>) -> Result<Context, PipelineError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, ctx: Context, next: Next<'_>) -> Result<Context, PipelineError> {
        (self.f)(ctx, next)
    }
}

/// A stage from a closure, for one-off cross-cutting concerns.
pub fn from_fn<F>(name: &'static str, f: F) -> Arc<dyn Stage>
where
    F: Fn(Context, Next<'_>) -> Result<Context, PipelineError> + Send + Sync + 'static,
{
    Arc::new(FnStage { name, f })
}
