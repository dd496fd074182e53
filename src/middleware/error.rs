use tracing::{error, warn};

use crate::errors::PipelineError;
use crate::server::{RawRequest, RawResponse};

/// Terminal boundary: the only place a [`PipelineError`] becomes a response.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, req: &RawRequest, err: &PipelineError) -> RawResponse;
}

/// Client errors become `{"error": message}` with their status; server-side
/// failures are logged and answered with a bare `Internal Server Error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonErrorReporter;

const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

impl ErrorReporter for JsonErrorReporter {
    fn report(&self, req: &RawRequest, err: &PipelineError) -> RawResponse {
        let status = err.status();
        match err {
            PipelineError::Database(db) | PipelineError::Transaction(db) => {
                error!(
                    request_id = %req.request_id,
                    kind = err.kind(),
                    code = db.code.as_deref().unwrap_or("-"),
                    message = %db.message,
                    "Database error"
                );
                RawResponse::text(status, INTERNAL_SERVER_ERROR)
            }
            _ if status >= 500 => {
                error!(
                    request_id = %req.request_id,
                    kind = err.kind(),
                    error = %err,
                    "Internal server error"
                );
                RawResponse::text(status, INTERNAL_SERVER_ERROR)
            }
            _ => {
                warn!(
                    request_id = %req.request_id,
                    kind = err.kind(),
                    status,
                    error = %err,
                    "Request rejected"
                );
                RawResponse::error(status, &err.to_string())
            }
        }
    }
}
