use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::{Claims, TokenVerifier};
use crate::config::JwtConfig;

/// HS256 access and refresh token keys.
///
/// Generated tokens always carry `iat` and `exp` (and `iss` when an issuer is
/// configured); verification rejects bad signatures, expired tokens and
/// foreign issuers.
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    issuer: Option<String>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl KeyPair {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

impl JwtKeys {
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&config.access_token_secret, config.access_token_ttl_secs),
            refresh: KeyPair::new(&config.refresh_token_secret, config.refresh_token_ttl_secs),
            issuer: config.issuer.clone(),
        }
    }

    pub fn generate_access_token(&self, payload: &Map<String, Value>) -> jsonwebtoken::errors::Result<String> {
        self.sign(&self.access, payload)
    }

    pub fn generate_refresh_token(&self, payload: &Map<String, Value>) -> jsonwebtoken::errors::Result<String> {
        self.sign(&self.refresh, payload)
    }

    #[must_use]
    pub fn verify_access_token(&self, token: &str) -> Option<Claims> {
        self.decode(&self.access, token, "access")
    }

    #[must_use]
    pub fn verify_refresh_token(&self, token: &str) -> Option<Claims> {
        self.decode(&self.refresh, token, "refresh")
    }

    fn sign(&self, keys: &KeyPair, payload: &Map<String, Value>) -> jsonwebtoken::errors::Result<String> {
        let now = unix_now();
        let mut claims = payload.clone();
        claims.entry("iat").or_insert_with(|| Value::from(now));
        claims
            .entry("exp")
            .or_insert_with(|| Value::from(now + keys.ttl_secs));
        if let Some(iss) = &self.issuer {
            claims
                .entry("iss")
                .or_insert_with(|| Value::String(iss.clone()));
        }
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
    }

    fn decode(&self, keys: &KeyPair, token: &str, kind: &'static str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss.as_str()]);
        }
        match jsonwebtoken::decode::<Value>(token, &keys.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        debug!(kind, "JWT verification failed: token expired");
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        warn!(kind, "JWT verification failed: invalid signature");
                    }
                    _ => {
                        debug!(kind, error = ?e, "JWT verification failed");
                    }
                }
                None
            }
        }
    }
}

impl TokenVerifier for JwtKeys {
    fn verify(&self, token: &str) -> Option<Claims> {
        self.verify_access_token(token)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
