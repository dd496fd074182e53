use std::sync::Arc;
use tracing::debug;

use super::Middleware;
use crate::security::{bearer_token, TokenVerifier};
use crate::server::{RawRequest, RawResponse};

/// Best-effort bearer token pass that runs for every request.
///
/// Verified claims are stored on [`RawRequest::claims`]; anything else leaves
/// the request anonymous. Never rejects: routes that require a token declare
/// an [`AuthStage`](crate::stages::AuthStage).
pub struct LenientAuth {
    verifier: Arc<dyn TokenVerifier>,
}

impl LenientAuth {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl Middleware for LenientAuth {
    fn before(&self, req: &mut RawRequest) -> Option<RawResponse> {
        let claims = bearer_token(req.get_header("authorization"))
            .ok()
            .and_then(|token| self.verifier.verify(token));
        if claims.is_some() {
            debug!(request_id = %req.request_id, "Request authenticated");
        }
        req.claims = claims;
        None
    }
}
