use std::sync::Arc;
use tracing::debug;

use super::core::{Next, Stage};
use crate::context::Context;
use crate::errors::PipelineError;
use crate::security::{bearer_token, TokenVerifier};

/// Rejects requests without a valid bearer token and attaches its claims.
pub struct AuthStage {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthStage {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn run(&self, ctx: Context, next: Next<'_>) -> Result<Context, PipelineError> {
        let claims = {
            let token = bearer_token(ctx.request().get_header("authorization"))?;
            self.verifier
                .verify(token)
                .ok_or_else(|| PipelineError::unauthenticated("Invalid or expired token"))?
        };
        debug!("Bearer token verified");

        // Claims from the lenient pass describe the same token; keep them.
        if ctx.token().is_some() {
            next.run(ctx)
        } else {
            next.run(ctx.with_token(claims)?)
        }
    }
}
