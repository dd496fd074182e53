use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::Arc;

use crate::errors::RegistryError;
use crate::server::ParamVec;

/// A compiled route pattern such as `/users/:id/posts/:postId`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

impl PathPattern {
    /// Compile `path` mounted under `prefix` (`""` for the root controller).
    ///
    /// `:name` segments capture one path segment. A trailing slash on the
    /// request is tolerated.
    pub fn compile(prefix: &str, path: &str) -> Result<Self, RegistryError> {
        let full = join(prefix, path);
        if !full.starts_with('/') {
            return Err(RegistryError::InvalidPath {
                path: full,
                reason: "must start with '/'".to_string(),
            });
        }

        let mut regex_src = String::with_capacity(full.len() + 8);
        regex_src.push('^');
        let mut param_names: Vec<Arc<str>> = Vec::with_capacity(full.matches(':').count());

        for segment in full.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(RegistryError::InvalidPath {
                        path: full.clone(),
                        reason: format!("invalid parameter segment '{segment}'"),
                    });
                }
                if param_names.iter().any(|p| p.as_ref() == name) {
                    return Err(RegistryError::InvalidPath {
                        path: full.clone(),
                        reason: format!("parameter '{name}' appears twice"),
                    });
                }
                regex_src.push_str("/([^/]+)");
                param_names.push(Arc::from(name));
            } else {
                regex_src.push('/');
                regex_src.push_str(&regex::escape(segment));
            }
        }

        if param_names.is_empty() && full == "/" {
            regex_src.push('/');
        } else {
            regex_src.push_str("/?");
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src).map_err(|e| RegistryError::InvalidPath {
            path: full.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: full,
            regex,
            param_names,
        })
    }

    /// The full mounted pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// The pattern with parameter names erased, so `/:id` and `/:uid`
    /// share a shape.
    #[must_use]
    pub fn shape(&self) -> &str {
        self.regex.as_str()
    }

    /// Match a request path, returning the percent-decoded parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                let value = percent_decode_str(m.as_str()).decode_utf8_lossy();
                params.push((Arc::clone(name), value.into_owned()));
            }
        }
        Some(params)
    }
}

fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), path) {
        (true, "") => "/".to_string(),
        (true, _) => path.to_string(),
        (false, "" | "/") => prefix.to_string(),
        (false, _) if path.starts_with('/') => format!("{prefix}{path}"),
        (false, _) => format!("{prefix}/{path}"),
    }
}
