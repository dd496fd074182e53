use std::time::Duration;

use tracing::{info, warn};

use super::Middleware;
use crate::server::{RawRequest, RawResponse, RequestId};

/// Logs every request on the way in and its status and latency on the way out.
///
/// Also assigns the request id: a valid inbound `x-request-id` is kept,
/// otherwise a fresh ULID is used. The id is echoed in the response.
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn before(&self, req: &mut RawRequest) -> Option<RawResponse> {
        req.request_id = RequestId::from_header_or_new(req.get_header("x-request-id"));
        info!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            ip = %req.client_ip(),
            "Incoming request"
        );
        None
    }

    fn after(&self, req: &RawRequest, res: &mut RawResponse, latency: Duration) {
        res.set_header("x-request-id", req.request_id.to_string());
        let latency_ms = latency.as_millis() as u64;
        if res.status >= 400 {
            warn!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = res.status,
                latency_ms,
                "Request completed with error"
            );
        } else {
            info!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = res.status,
                latency_ms,
                "Request completed"
            );
        }
    }
}
