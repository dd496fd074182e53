use serde_json::{Map, Value};
use tracing::{debug, error};

use super::core::{Next, Stage};
use crate::context::{Context, Params};
use crate::errors::PipelineError;
use crate::schema::{coerce_query_value, describe, validate, Descriptor};

/// Which slice of the request a params stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Body,
    Query,
}

/// Validates declared fields and attaches exactly those fields to the context.
///
/// Fields are checked in declaration order and the first failure wins.
/// Undeclared fields never reach the handler.
#[derive(Debug, Clone)]
pub struct ParamsStage {
    source: Source,
    fields: Vec<(String, Descriptor)>,
}

impl ParamsStage {
    pub fn new<I, K>(source: Source, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        Self {
            source,
            fields: fields.into_iter().map(|(k, d)| (k.into(), d)).collect(),
        }
    }

    pub fn body<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        Self::new(Source::Body, fields)
    }

    pub fn query<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        Self::new(Source::Query, fields)
    }

    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, Descriptor)] {
        &self.fields
    }

    /// Validate `raw` against the declared fields.
    pub fn extract(&self, raw: Option<&Map<String, Value>>) -> Result<Params, PipelineError> {
        let mut validated = Params::new();
        for (field, descriptor) in &self.fields {
            let Some(value) = raw.and_then(|r| r.get(field)) else {
                if descriptor.is_optional() {
                    continue;
                }
                return Err(PipelineError::missing_parameter(field.as_str()));
            };

            let required = descriptor.required();
            let value = match self.source {
                Source::Query => coerce_query_value(value.clone(), required),
                Source::Body => value.clone(),
            };

            match validate(&value, required) {
                Ok(true) => {
                    validated.insert(field.clone(), value);
                }
                Ok(false) => {
                    return Err(PipelineError::invalid_parameter_type(
                        field.as_str(),
                        describe(required),
                    ));
                }
                Err(e) => {
                    error!(field = %field, error = %e, "Route schema has no validator");
                    return Err(PipelineError::ValidationConfig {
                        field: field.clone(),
                        descriptor: describe(required),
                    });
                }
            }
        }
        Ok(validated)
    }
}

impl Stage for ParamsStage {
    fn name(&self) -> &'static str {
        match self.source {
            Source::Body => "body",
            Source::Query => "query",
        }
    }

    fn run(&self, ctx: Context, next: Next<'_>) -> Result<Context, PipelineError> {
        let validated = match self.source {
            Source::Body => self.extract(ctx.request().body_fields())?,
            Source::Query => self.extract(Some(&ctx.request().query))?,
        };
        debug!(
            source = self.name(),
            fields = validated.len(),
            "Parameters validated"
        );
        let ctx = match self.source {
            Source::Body => ctx.with_body(validated)?,
            Source::Query => ctx.with_query(validated)?,
        };
        next.run(ctx)
    }
}
