use http::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Maximum number of headers/cookies before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Header and cookie storage. Names use `Arc<str>` so cloning is O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Path parameter storage (`/users/:id` → `[("id", "42")]`).
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Per-request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an inbound `x-request-id` when it is a valid ULID, otherwise mint one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// Raw request as handed over by the transport layer.
///
/// Query values are kept as JSON: a key that appears once is a string, a key
/// that repeats (`?tag=a&tag=b`) becomes an array of strings.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query: Map<String, Value>,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    /// Parsed JSON body, if one was sent
    pub body: Option<Value>,
    /// Set when a body was sent but was not valid JSON
    pub body_error: Option<String>,
    /// Peer address as reported by the transport
    pub remote_addr: Option<String>,
    /// Filled by path matching
    pub path_params: ParamVec,
    /// Claims attached by the lenient auth pre-pass
    pub claims: Option<Value>,
}

impl RawRequest {
    /// Build a request from a method and a target such as `/users?limit=10`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Map::new()),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            request_id: RequestId::new(),
            method,
            path: path.to_string(),
            query,
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: None,
            body_error: None,
            remote_addr: None,
            path_params: ParamVec::new(),
            claims: None,
        }
    }

    /// Add a header; a `cookie` header is also parsed into [`RawRequest::cookies`].
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            self.cookies.extend(parse_cookies(&value));
        }
        self.headers.push((Arc::from(name.as_str()), value));
        self
    }

    #[must_use]
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a raw body, parsing it as JSON. Empty bodies are ignored.
    #[must_use]
    pub fn with_raw_body(mut self, bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return self;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v) => self.body = Some(v),
            Err(e) => {
                debug!(request_id = %self.request_id, error = %e, "Request body is not valid JSON");
                self.body_error = Some(e.to_string());
            }
        }
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a path parameter by name. Last occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Body as an object, for the parameter stage. Non-object bodies have no fields.
    #[must_use]
    pub fn body_fields(&self) -> Option<&Map<String, Value>> {
        self.body.as_ref().and_then(Value::as_object)
    }

    /// `x-forwarded-for`, else the peer address; `::1` is shown as `localhost`.
    #[must_use]
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self.get_header("x-forwarded-for") {
            return forwarded.to_string();
        }
        match self.remote_addr.as_deref() {
            Some("::1") => "localhost".to_string(),
            Some(addr) => addr.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Parse a `Cookie` header value into name/value pairs.
#[must_use]
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((Arc::from(name), value))
        })
        .collect()
}

/// URL-decode a query string. Repeated keys collect into an array.
#[must_use]
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(v.into_owned());
        match out.get_mut(k.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(k.into_owned(), value);
            }
        }
    }
    out
}
