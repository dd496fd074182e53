//! # Security Module
//!
//! Bearer-token handling shared by the two authentication passes:
//!
//! - the blanket [`LenientAuth`](crate::middleware::LenientAuth) middleware,
//!   which runs for every request and never rejects, and
//! - the per-route [`AuthStage`](crate::stages::AuthStage), which rejects.
//!
//! Both parse the `Authorization` header with [`bearer_token`] and verify the
//! token through a [`TokenVerifier`]. [`JwtKeys`] is the HS256 implementation
//! used in production; tests plug in their own verifiers.
//!
//! ```rust
//! use serde_json::{json, Map};
//! use stagehand::config::JwtConfig;
//! use stagehand::security::{JwtKeys, TokenVerifier};
//!
//! let keys = JwtKeys::new(&JwtConfig {
//!     access_token_secret: "access".into(),
//!     refresh_token_secret: "refresh".into(),
//!     ..JwtConfig::default()
//! });
//! let mut payload = Map::new();
//! payload.insert("sub".into(), json!("user-1"));
//! let token = keys.generate_access_token(&payload).unwrap();
//! let claims = keys.verify(&token).unwrap();
//! assert_eq!(claims["sub"], "user-1");
//! assert!(keys.verify_refresh_token(&token).is_none());
//! ```

use serde_json::Value;

use crate::errors::PipelineError;

mod jwt;

pub use jwt::JwtKeys;

/// Decoded token claims.
pub type Claims = Value;

/// Verifies a bearer token and returns its claims.
///
/// Verification is synchronous (a signature check against a secret).
pub trait TokenVerifier: Send + Sync {
    /// `None` when the signature, expiry or issuer check fails
    fn verify(&self, token: &str) -> Option<Claims>;
}

/// Extract the token from an `Authorization` header value.
///
/// Grammar: `"Bearer " token`, split on single spaces. A missing or empty
/// header is `Unauthenticated`; any other scheme, or an empty token, is
/// `MalformedCredential`.
pub fn bearer_token(header: Option<&str>) -> Result<&str, PipelineError> {
    let header = header
        .filter(|h| !h.is_empty())
        .ok_or_else(|| PipelineError::unauthenticated("Unauthorized"))?;
    let mut parts = header.split(' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme != "Bearer" {
        return Err(PipelineError::malformed_credential("Invalid token type"));
    }
    if token.is_empty() {
        return Err(PipelineError::malformed_credential("Invalid token"));
    }
    Ok(token)
}
