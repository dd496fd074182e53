use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    )
    .expect("Failed to compile UUID regex")
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Failed to compile email regex"));

/// Leaf types with a built-in validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Non-empty string
    String,
    /// Any JSON number
    Number,
    /// `true` or `false`
    Boolean,
    /// JSON object (not an array, not null)
    Object,
    /// Canonical 8-4-4-4-12 hex UUID, case-insensitive
    Uuid,
    /// `local@domain.tld` with no whitespace
    Email,
}

impl Primitive {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Primitive::String => "String",
            Primitive::Number => "Number",
            Primitive::Boolean => "Boolean",
            Primitive::Object => "Object",
            Primitive::Uuid => "UUID",
            Primitive::Email => "Email",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "String" => Some(Primitive::String),
            "Number" => Some(Primitive::Number),
            "Boolean" => Some(Primitive::Boolean),
            "Object" => Some(Primitive::Object),
            "UUID" => Some(Primitive::Uuid),
            "Email" => Some(Primitive::Email),
            _ => None,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Primitive::String => value.as_str().is_some_and(|s| !s.is_empty()),
            Primitive::Number => value.is_number(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::Object => value.is_object(),
            Primitive::Uuid => value.as_str().is_some_and(|s| UUID_RE.is_match(s)),
            Primitive::Email => value.as_str().is_some_and(|s| EMAIL_RE.is_match(s)),
        }
    }
}

/// Expected shape of one parameter.
///
/// Descriptors are plain data built once when a route is declared; they are
/// never mutated afterwards, so they cannot be cyclic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Primitive(Primitive),
    /// String whose length (in chars) lies in `[min, max]`; no `max` means unbounded
    Varchar { min: usize, max: Option<usize> },
    /// Sequence whose every element satisfies the inner descriptor
    ArrayOf(Box<Descriptor>),
    /// May be absent; when present must satisfy the inner descriptor
    Optional(Box<Descriptor>),
    /// A type name with no registered validator
    Named(String),
}

impl Descriptor {
    #[must_use]
    pub fn string() -> Self {
        Descriptor::Primitive(Primitive::String)
    }

    #[must_use]
    pub fn number() -> Self {
        Descriptor::Primitive(Primitive::Number)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Descriptor::Primitive(Primitive::Boolean)
    }

    #[must_use]
    pub fn object() -> Self {
        Descriptor::Primitive(Primitive::Object)
    }

    #[must_use]
    pub fn uuid() -> Self {
        Descriptor::Primitive(Primitive::Uuid)
    }

    #[must_use]
    pub fn email() -> Self {
        Descriptor::Primitive(Primitive::Email)
    }

    /// Bounded string. `Varchar::default()` bounds are `[0, +inf)`.
    #[must_use]
    pub fn varchar(min: usize, max: Option<usize>) -> Self {
        Descriptor::Varchar { min, max }
    }

    #[must_use]
    pub fn array_of(inner: Descriptor) -> Self {
        Descriptor::ArrayOf(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: Descriptor) -> Self {
        Descriptor::Optional(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Descriptor::Named(name.into())
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Descriptor::Optional(_))
    }

    /// Strip one `Optional` layer, if any.
    #[must_use]
    pub fn required(&self) -> &Descriptor {
        match self {
            Descriptor::Optional(inner) => inner,
            other => other,
        }
    }

    /// Check that the descriptor resolves, recursively, to known validators.
    pub fn check(&self) -> Result<(), SchemaError> {
        match self {
            Descriptor::Primitive(_) => Ok(()),
            Descriptor::Varchar { min, max } => match max {
                Some(max) if max < min => Err(SchemaError::InvalidBounds {
                    min: *min,
                    max: *max,
                }),
                _ => Ok(()),
            },
            Descriptor::ArrayOf(inner) | Descriptor::Optional(inner) => inner.check(),
            Descriptor::Named(name) => Err(SchemaError::UnknownType(name.clone())),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Primitive(p) => write!(f, "{}", p.label()),
            Descriptor::Varchar { min, max: Some(max) } => write!(f, "Varchar({},{})", min, max),
            Descriptor::Varchar { min, max: None } => write!(f, "Varchar({})", min),
            Descriptor::ArrayOf(inner) => write!(f, "Array<{}>", inner),
            Descriptor::Optional(inner) => write!(f, "Optional<{}>", inner),
            Descriptor::Named(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Descriptor {
    type Err = SchemaError;

    /// Parse a label as produced by [`describe`].
    ///
    /// Unknown identifiers parse to [`Descriptor::Named`]; they only fail when
    /// a value is validated against them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if let Some(inner) = strip_wrapper(label, "Array<", '>') {
            return Ok(Descriptor::array_of(inner.parse()?));
        }
        if let Some(inner) = strip_wrapper(label, "Optional<", '>') {
            return Ok(Descriptor::optional(inner.parse()?));
        }
        if let Some(bounds) = strip_wrapper(label, "Varchar(", ')') {
            return parse_varchar(label, bounds);
        }
        if label == "Varchar" {
            return Ok(Descriptor::varchar(0, None));
        }
        if let Some(p) = Primitive::from_label(label) {
            return Ok(Descriptor::Primitive(p));
        }
        let is_ident = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_ident {
            Ok(Descriptor::Named(label.to_string()))
        } else {
            Err(SchemaError::Parse {
                label: s.to_string(),
                reason: "not a type name".to_string(),
            })
        }
    }
}

fn strip_wrapper<'a>(label: &'a str, prefix: &str, close: char) -> Option<&'a str> {
    label.strip_prefix(prefix)?.strip_suffix(close)
}

fn parse_varchar(label: &str, bounds: &str) -> Result<Descriptor, SchemaError> {
    let parse_bound = |raw: &str| {
        raw.trim().parse::<usize>().map_err(|e| SchemaError::Parse {
            label: label.to_string(),
            reason: e.to_string(),
        })
    };
    let mut parts = bounds.splitn(2, ',');
    let min = match parts.next() {
        Some(raw) if !raw.trim().is_empty() => parse_bound(raw)?,
        _ => 0,
    };
    let max = match parts.next() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_bound(raw)?),
        _ => None,
    };
    let descriptor = Descriptor::varchar(min, max);
    descriptor.check()?;
    Ok(descriptor)
}

/// Schema-side failure: the descriptor itself is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Descriptor names a type with no validator
    UnknownType(String),
    /// `Varchar` with `max < min`
    InvalidBounds { min: usize, max: usize },
    /// Label could not be parsed
    Parse { label: String, reason: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownType(name) => write!(f, "unknown schema type '{}'", name),
            SchemaError::InvalidBounds { min, max } => {
                write!(f, "invalid Varchar bounds: min {} exceeds max {}", min, max)
            }
            SchemaError::Parse { label, reason } => {
                write!(f, "cannot parse descriptor '{}': {}", label, reason)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Validate `value` against `descriptor`.
///
/// `Ok(false)` means bad data; `Err` means the descriptor itself does not
/// resolve and no value could ever satisfy it.
pub fn validate(value: &Value, descriptor: &Descriptor) -> Result<bool, SchemaError> {
    descriptor.check()?;
    Ok(matches(value, descriptor))
}

// Assumes `check()` already passed.
fn matches(value: &Value, descriptor: &Descriptor) -> bool {
    match descriptor {
        Descriptor::Primitive(p) => p.accepts(value),
        Descriptor::Varchar { min, max } => value.as_str().is_some_and(|s| {
            let len = s.chars().count();
            len >= *min && max.map_or(true, |max| len <= max)
        }),
        Descriptor::ArrayOf(inner) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|item| matches(item, inner))),
        Descriptor::Optional(inner) => matches(value, inner),
        Descriptor::Named(_) => false,
    }
}

/// Human-readable label, e.g. `Array<UUID>`.
#[must_use]
pub fn describe(descriptor: &Descriptor) -> String {
    descriptor.to_string()
}

/// Convert wire-format query strings into the JSON type the descriptor expects.
///
/// Values that cannot be converted are returned unchanged so validation
/// reports them.
#[must_use]
pub fn coerce_query_value(value: Value, descriptor: &Descriptor) -> Value {
    match descriptor.required() {
        Descriptor::Primitive(Primitive::Number) => match &value {
            Value::String(s) => parse_number(s).map(Value::Number).unwrap_or(value),
            _ => value,
        },
        Descriptor::Primitive(Primitive::Boolean) => match value.as_str() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => value,
        },
        Descriptor::ArrayOf(inner) => match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| coerce_query_value(item, inner))
                    .collect(),
            ),
            Value::String(_) => Value::Array(vec![coerce_query_value(value, inner)]),
            other => other,
        },
        _ => value,
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}
