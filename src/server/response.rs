use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::request::HeaderVec;

/// Response under construction, owned by the handler while the chain runs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawResponse {
    /// HTTP status code (200, 404, 500, etc.)
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// Response body as JSON; `Null` means no body
    pub body: Value,
}

impl Default for RawResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Value::Null,
        }
    }
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type` header.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut res = Self::new(status, HeaderVec::new(), Value::Null);
        res.send_json(status, body);
        res
    }

    /// `{ "error": message }`
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    /// Plain-text response; the body is carried as a JSON string.
    #[must_use]
    pub fn text(status: u16, message: &str) -> Self {
        let mut res = Self::new(status, HeaderVec::new(), Value::String(message.to_string()));
        res.set_header("content-type", "text/plain; charset=utf-8".to_string());
        res
    }

    /// Replace status and body in place, as a handler does.
    pub fn send_json(&mut self, status: u16, body: Value) {
        self.status = status;
        self.body = body;
        self.set_header("content-type", "application/json".to_string());
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}
