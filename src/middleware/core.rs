use std::time::Duration;

use crate::server::{RawRequest, RawResponse};

/// Transport-level hook that runs around every request, matched or not.
///
/// `before` runs in registration order and may answer the request itself by
/// returning a response; `after` runs in reverse order on whatever response
/// is about to be sent.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &mut RawRequest) -> Option<RawResponse> {
        None
    }
    fn after(&self, _req: &RawRequest, _res: &mut RawResponse, _latency: Duration) {}
}
