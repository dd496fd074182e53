//! # Configuration Module
//!
//! Configuration is read once at startup, from a YAML file and/or environment
//! variables, and then handed to the pieces that need it by handle. Nothing in
//! this crate keeps configuration in a global.
//!
//! ## Example Configuration
//!
//! ```yaml
//! database:
//!   max_connections: 10
//! jwt:
//!   access_token_secret: change-me
//!   refresh_token_secret: change-me-too
//!   access_token_ttl_secs: 900
//!   refresh_token_ttl_secs: 604800
//!   issuer: my-service
//! runtime:
//!   stack_size: 0x10000
//! ```
//!
//! ## Environment Variables
//!
//! Environment values override the file:
//!
//! - `STAGEHAND_JWT_ACCESS_SECRET` / `STAGEHAND_JWT_REFRESH_SECRET`
//! - `STAGEHAND_DB_MAX_CONNECTIONS`
//! - `STAGEHAND_STACK_SIZE` (decimal or `0x` hexadecimal)

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::Path;

/// Default coroutine stack size (64 KiB).
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Everything needed to assemble an [`App`](crate::app::App).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub database: PoolConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Connection pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    10
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Secrets and lifetimes for access and refresh tokens.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtConfig {
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default)]
    pub refresh_token_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    /// When set, generated tokens carry it and verification requires it
    #[serde(default)]
    pub issuer: Option<String>,
}

fn default_access_ttl() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            issuer: None,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Coroutine runtime settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for request coroutines in bytes
    #[serde(
        default = "default_stack_size",
        deserialize_with = "deserialize_stack_size"
    )]
    pub stack_size: usize,
}

fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load from `STAGEHAND_STACK_SIZE`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("STAGEHAND_STACK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }
}

/// Parse `16384` or `0x4000`.
#[must_use]
pub fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

// YAML reads `0x10000` as a string, so accept both forms.
fn deserialize_stack_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(usize),
        Text(String),
    }
    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack size '{}'", s))),
    }
}

impl AppConfig {
    /// Read a YAML file, then apply environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for deployments without a file.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("STAGEHAND_JWT_ACCESS_SECRET") {
            self.jwt.access_token_secret = secret;
        }
        if let Some(secret) = lookup("STAGEHAND_JWT_REFRESH_SECRET") {
            self.jwt.refresh_token_secret = secret;
        }
        if let Some(max) = lookup("STAGEHAND_DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = max;
        }
        if let Some(size) = lookup("STAGEHAND_STACK_SIZE").and_then(|v| parse_size(&v)) {
            self.runtime.stack_size = size;
        }
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.access_token_secret.is_empty() {
            anyhow::bail!("jwt.access_token_secret must be set");
        }
        if self.jwt.refresh_token_secret.is_empty() {
            anyhow::bail!("jwt.refresh_token_secret must be set");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }
}
