//! Per-request context threaded through every stage and the handler.
//!
//! A [`Context`] starts with the raw request and a default response. Stages add
//! to it by value (`ctx.with_body(..)?`) and pass the result on, so each link
//! sees everything the links before it added. Stage-owned fields are
//! write-once: setting one twice is an `Internal` error rather than a silent
//! overwrite.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::database::DbSession;
use crate::errors::PipelineError;
use crate::security::Claims;
use crate::server::{RawRequest, RawResponse};

/// Validated parameter set, field name → value.
pub type Params = Map<String, Value>;

#[derive(Debug)]
pub struct Context {
    request: Arc<RawRequest>,
    response: RawResponse,
    token: Option<Claims>,
    body: Option<Params>,
    query: Option<Params>,
    db: Option<DbSession>,
    extensions: Map<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new(request: RawRequest) -> Self {
        Self::from_shared(Arc::new(request))
    }

    /// Build over a request the transport layer keeps a handle to.
    #[must_use]
    pub fn from_shared(request: Arc<RawRequest>) -> Self {
        Self {
            request,
            response: RawResponse::default(),
            token: None,
            body: None,
            query: None,
            db: None,
            extensions: Map::new(),
        }
    }

    pub fn with_token(mut self, claims: Claims) -> Result<Self, PipelineError> {
        set_once(&mut self.token, claims, "token")?;
        Ok(self)
    }

    pub fn with_body(mut self, body: Params) -> Result<Self, PipelineError> {
        set_once(&mut self.body, body, "validated body")?;
        Ok(self)
    }

    pub fn with_query(mut self, query: Params) -> Result<Self, PipelineError> {
        set_once(&mut self.query, query, "validated query")?;
        Ok(self)
    }

    pub fn with_db(mut self, db: DbSession) -> Result<Self, PipelineError> {
        set_once(&mut self.db, db, "database session")?;
        Ok(self)
    }

    /// Shadow the session for a nested transaction scope, handing back the
    /// one it replaced.
    pub(crate) fn replace_db(mut self, db: Option<DbSession>) -> (Self, Option<DbSession>) {
        let previous = std::mem::replace(&mut self.db, db);
        (self, previous)
    }

    /// Attach a custom field. Keys are write-once like the built-in fields.
    pub fn extend(mut self, key: impl Into<String>, value: Value) -> Result<Self, PipelineError> {
        let key = key.into();
        if self.extensions.contains_key(&key) {
            return Err(PipelineError::internal(format!(
                "Context field '{key}' is already set"
            )));
        }
        self.extensions.insert(key, value);
        Ok(self)
    }

    pub fn request(&self) -> &RawRequest {
        &self.request
    }

    pub fn response(&self) -> &RawResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut RawResponse {
        &mut self.response
    }

    pub fn into_response(self) -> RawResponse {
        self.response
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.request.get_path_param(name)
    }

    pub fn token(&self) -> Option<&Claims> {
        self.token.as_ref()
    }

    pub fn body(&self) -> Option<&Params> {
        self.body.as_ref()
    }

    pub fn query(&self) -> Option<&Params> {
        self.query.as_ref()
    }

    pub fn db(&self) -> Option<&DbSession> {
        self.db.as_ref()
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn ensure_token(&self) -> Result<&Claims, PipelineError> {
        self.token
            .as_ref()
            .ok_or_else(|| missing("token", "an auth stage"))
    }

    pub fn ensure_body(&self) -> Result<&Params, PipelineError> {
        self.body
            .as_ref()
            .ok_or_else(|| missing("validated body", "a body params stage"))
    }

    pub fn ensure_query(&self) -> Result<&Params, PipelineError> {
        self.query
            .as_ref()
            .ok_or_else(|| missing("validated query", "a query params stage"))
    }

    pub fn ensure_db(&self) -> Result<&DbSession, PipelineError> {
        self.db
            .as_ref()
            .ok_or_else(|| missing("database session", "a transaction stage"))
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<(), PipelineError> {
    if slot.is_some() {
        return Err(PipelineError::internal(format!(
            "Context field '{field}' is already set"
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn missing(field: &str, stage: &str) -> PipelineError {
    PipelineError::internal(format!(
        "Context has no {field}; the route must declare {stage}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new(RawRequest::new(Method::GET, "/users/42"))
    }

    #[test]
    fn test_fields_are_write_once() {
        let ctx = ctx().with_token(json!({"sub": "u1"})).unwrap();
        let err = ctx.with_token(json!({"sub": "u2"})).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[test]
    fn test_additions_accumulate() {
        let mut body = Params::new();
        body.insert("email".to_string(), json!("a@b.co"));
        let ctx = ctx()
            .with_token(json!({"sub": "u1"}))
            .unwrap()
            .with_body(body)
            .unwrap()
            .extend("tenant", json!("acme"))
            .unwrap();

        assert_eq!(ctx.ensure_token().unwrap()["sub"], "u1");
        assert_eq!(ctx.ensure_body().unwrap()["email"], "a@b.co");
        assert_eq!(ctx.extension("tenant"), Some(&json!("acme")));
        assert!(ctx.query().is_none());
    }

    #[test]
    fn test_extension_keys_are_write_once() {
        let ctx = ctx().extend("tenant", json!("a")).unwrap();
        assert!(ctx.extend("tenant", json!("b")).is_err());
    }

    #[test]
    fn test_ensure_reports_missing_stage() {
        let ctx = ctx();
        match ctx.ensure_db() {
            Err(PipelineError::Internal(msg)) => assert!(msg.contains("transaction stage")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(ctx.ensure_query().is_err());
    }

    #[test]
    fn test_replace_db_returns_previous() {
        let (ctx, previous) = ctx().replace_db(None);
        assert!(previous.is_none());
        assert!(ctx.db().is_none());
    }

    #[test]
    fn test_response_is_mutable() {
        let mut ctx = ctx();
        ctx.response_mut().status = 201;
        assert_eq!(ctx.into_response().status, 201);
    }
}
