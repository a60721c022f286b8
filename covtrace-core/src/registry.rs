//! Canonical endpoint identity and lookup.

use std::collections::BTreeMap;

use crate::domain::{Endpoint, HttpMethod};
use crate::error::{CovTraceError, Result};

/// Endpoints of one service, keyed by endpoint key.
///
/// Built once per run; nothing mutates it after analysis starts.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, Endpoint>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from parsed endpoints, rejecting conflicting keys.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self> {
        let mut registry = Self::new();
        for endpoint in endpoints {
            registry.register(&endpoint.key, endpoint.method, &endpoint.path_template)?;
        }
        Ok(registry)
    }

    /// Register an operation under `key`.
    ///
    /// Registering the same tuple twice is a no-op; reusing `key` for another
    /// operation is an error.
    pub fn register(&mut self, key: &str, method: HttpMethod, path_template: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CovTraceError::Other(format!(
                "endpoint key is empty for {method} {path_template}"
            )));
        }
        let path_template = normalize_path_template(path_template);

        if let Some(existing) = self.endpoints.get(key) {
            if existing.method == method && existing.path_template == path_template {
                return Ok(());
            }
            return Err(CovTraceError::DuplicateKey {
                key: key.to_string(),
                existing: existing.operation(),
                incoming: format!("{method} {path_template}"),
            });
        }

        let endpoint = Endpoint {
            key: key.to_string(),
            method,
            path_segments: path_segments(&path_template),
            path_template,
        };
        self.endpoints.insert(key.to_string(), endpoint);
        Ok(())
    }

    /// Look up an endpoint by key.
    pub fn resolve(&self, key: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(key)
            .ok_or_else(|| CovTraceError::UnknownEndpoint(key.to_string()))
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.endpoints.contains_key(key)
    }

    /// Endpoints in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Normalize a path template: leading `/`, no duplicate or trailing `/`,
/// `:param` rewritten to `{param}`.
pub fn normalize_path_template(path: &str) -> String {
    let segments: Vec<String> = path
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_string(),
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Static, lower-cased segments of a normalized template that identify the
/// resource family: parameters, `api` and version prefixes are dropped.
pub fn path_segments(path_template: &str) -> Vec<String> {
    let mut segments: Vec<String> = path_template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !is_parameter(segment))
        .map(str::to_lowercase)
        .filter(|segment| segment != "api" && !is_version_segment(segment))
        .collect();
    segments.sort();
    segments.dedup();
    segments
}

fn is_parameter(segment: &str) -> bool {
    (segment.starts_with('{') && segment.ends_with('}')) || segment.starts_with(':')
}

fn is_version_segment(segment: &str) -> bool {
    let Some(rest) = segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::{EndpointRegistry, normalize_path_template, path_segments};
    use crate::domain::HttpMethod;
    use crate::error::CovTraceError;

    #[test]
    fn resolve_after_register_returns_identical_tuple() {
        let mut registry = EndpointRegistry::new();
        registry
            .register("POST_CreateCustomer", HttpMethod::Post, "/api/v1/customers")
            .expect("register");

        let endpoint = registry.resolve("POST_CreateCustomer").expect("resolve");
        assert_eq!(endpoint.method, HttpMethod::Post);
        assert_eq!(endpoint.path_template, "/api/v1/customers");
        assert_eq!(endpoint.path_segments, vec!["customers".to_string()]);
    }

    #[test]
    fn resolve_unknown_key_fails() {
        let registry = EndpointRegistry::new();
        let error = registry.resolve("GET_Missing").expect_err("unknown");
        assert!(matches!(error, CovTraceError::UnknownEndpoint(key) if key == "GET_Missing"));
    }

    #[test]
    fn register_rejects_conflicting_duplicate() {
        let mut registry = EndpointRegistry::new();
        registry
            .register("GET_Customer", HttpMethod::Get, "/customers/{id}")
            .expect("first");
        registry
            .register("GET_Customer", HttpMethod::Get, "/customers/{id}/")
            .expect("identical tuple after normalization is accepted");

        let error = registry
            .register("GET_Customer", HttpMethod::Delete, "/customers/{id}")
            .expect_err("conflict");
        assert!(matches!(error, CovTraceError::DuplicateKey { .. }));
        assert!(error.is_configuration());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_rejects_empty_key() {
        let mut registry = EndpointRegistry::new();
        assert!(registry.register("  ", HttpMethod::Get, "/x").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn normalizes_templates() {
        assert_eq!(normalize_path_template("customers//:id/"), "/customers/{id}");
        assert_eq!(normalize_path_template("/"), "/");
    }

    #[test]
    fn segments_skip_parameters_and_versions() {
        assert_eq!(
            path_segments("/api/v2/Customers/{id}/email"),
            vec!["customers".to_string(), "email".to_string()]
        );
        assert_eq!(path_segments("/vendors"), vec!["vendors".to_string()]);
    }
}
