//! # Error Taxonomy
//!
//! Every failure a stage, handler or the transaction machinery can raise is a
//! [`PipelineError`]. Stages fail fast: the first error aborts the chain and is
//! handed unchanged to the terminal [`ErrorReporter`](crate::middleware::ErrorReporter),
//! which is the only place where kinds are turned into HTTP responses.
//!
//! Setup-time problems (duplicate routes, malformed path patterns, unparsable
//! descriptor labels) have their own types so they can never leak into a
//! request.

use std::fmt;

use http::Method;

/// Error reported by a database driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Driver error code (SQLSTATE for Postgres-like drivers), if known
    pub code: Option<String>,
    /// Driver message
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DbError {}

/// Failure raised while processing one request.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Missing, invalid or expired credential
    Unauthenticated(String),
    /// Wrong authorization scheme or empty token
    MalformedCredential(String),
    /// A declared, non-optional parameter was absent
    MissingParameter { field: String },
    /// A parameter was present but did not match its descriptor
    InvalidParameterType { field: String, expected: String },
    /// The route's own schema references a type with no validator
    ValidationConfig { field: String, descriptor: String },
    /// Begin/commit (or connection checkout) failed
    Transaction(DbError),
    /// A database error raised while the handler was running
    Database(DbError),
    /// The request body was not valid JSON
    MalformedBody,
    /// Handler-raised: generic client error
    BadRequest(String),
    /// Handler-raised: authenticated but not allowed
    Forbidden(String),
    /// Handler-raised or no matching route
    NotFound(String),
    /// Handler-raised: state conflict
    Conflict(String),
    /// Anything unanticipated
    Internal(String),
}

impl PipelineError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn malformed_credential(message: impl Into<String>) -> Self {
        Self::MalformedCredential(message.into())
    }

    pub fn missing_parameter(field: impl Into<String>) -> Self {
        Self::MissingParameter {
            field: field.into(),
        }
    }

    pub fn invalid_parameter_type(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidParameterType {
            field: field.into(),
            expected: expected.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status the terminal reporter uses for this kind.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Unauthenticated(_) => 401,
            PipelineError::MalformedCredential(_)
            | PipelineError::MissingParameter { .. }
            | PipelineError::InvalidParameterType { .. }
            | PipelineError::MalformedBody
            | PipelineError::BadRequest(_) => 400,
            PipelineError::Forbidden(_) => 403,
            PipelineError::NotFound(_) => 404,
            PipelineError::Conflict(_) => 409,
            PipelineError::ValidationConfig { .. }
            | PipelineError::Transaction(_)
            | PipelineError::Database(_)
            | PipelineError::Internal(_) => 500,
        }
    }

    /// Short machine-readable kind, used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Unauthenticated(_) => "unauthenticated",
            PipelineError::MalformedCredential(_) => "malformed_credential",
            PipelineError::MissingParameter { .. } => "missing_parameter",
            PipelineError::InvalidParameterType { .. } => "invalid_parameter_type",
            PipelineError::ValidationConfig { .. } => "validation_config",
            PipelineError::Transaction(_) => "transaction_failure",
            PipelineError::Database(_) => "database",
            PipelineError::MalformedBody => "malformed_body",
            PipelineError::BadRequest(_) => "bad_request",
            PipelineError::Forbidden(_) => "forbidden",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Unauthenticated(msg)
            | PipelineError::MalformedCredential(msg)
            | PipelineError::BadRequest(msg)
            | PipelineError::Forbidden(msg)
            | PipelineError::NotFound(msg)
            | PipelineError::Conflict(msg)
            | PipelineError::Internal(msg) => write!(f, "{}", msg),
            PipelineError::MissingParameter { field } => {
                write!(f, "Missing required parameter: {}", field)
            }
            PipelineError::InvalidParameterType { field, expected } => {
                write!(f, "Parameter {} must be of type {}", field, expected)
            }
            PipelineError::ValidationConfig { field, descriptor } => {
                write!(f, "Unknown type {} for parameter {}", descriptor, field)
            }
            PipelineError::Transaction(e) => write!(f, "Transaction failed: {}", e),
            PipelineError::Database(e) => write!(f, "Database error: {}", e),
            PipelineError::MalformedBody => write!(f, "Invalid JSON payload"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Transaction(e) | PipelineError::Database(e) => Some(e),
            _ => None,
        }
    }
}

/// Database errors raised from handler code surface as `Database`.
impl From<DbError> for PipelineError {
    fn from(e: DbError) -> Self {
        PipelineError::Database(e)
    }
}

/// Failure while mounting controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two handlers of one controller claim the same verb and path
    DuplicateRoute {
        controller: String,
        method: Method,
        path: String,
    },
    /// A path pattern could not be compiled
    InvalidPath { path: String, reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateRoute {
                controller,
                method,
                path,
            } => write!(
                f,
                "Route registry error: controller '{}' registers {} {} more than once",
                controller, method, path
            ),
            RegistryError::InvalidPath { path, reason } => {
                write!(f, "Route registry error: invalid path '{}': {}", path, reason)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
