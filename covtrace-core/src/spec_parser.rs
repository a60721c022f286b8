//! OpenAPI 3 and Swagger 2 documents to endpoint records.

use std::path::Path;

use serde_json::Value;

use crate::domain::{Endpoint, HttpMethod};
use crate::error::{CovTraceError, Result, SourceLocation};
use crate::fs::FileSystem;
use crate::registry::{EndpointRegistry, normalize_path_template, path_segments};

const OPERATION_METHODS: [(&str, HttpMethod); 7] = [
    ("get", HttpMethod::Get),
    ("post", HttpMethod::Post),
    ("put", HttpMethod::Put),
    ("patch", HttpMethod::Patch),
    ("delete", HttpMethod::Delete),
    ("head", HttpMethod::Head),
    ("options", HttpMethod::Options),
];

/// Serialization of an API description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
}

impl SpecFormat {
    /// Format implied by a file extension; YAML unless the file ends in `.json`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse an OpenAPI 3 or Swagger 2 document.
///
/// Keys are `{METHOD}_{operationId}`; operations without an id are keyed by
/// their static path segments in PascalCase, with parameters as `By{Name}`.
/// Swagger `basePath` is prefixed to every path.
pub fn parse_spec(
    source: &str,
    format: SpecFormat,
    origin: Option<&Path>,
) -> Result<Vec<Endpoint>> {
    let location = || match origin {
        Some(path) => SourceLocation::file(path),
        None => SourceLocation::default(),
    };
    let document: Value = match format {
        SpecFormat::Json => serde_json::from_str(source).map_err(|err| {
            CovTraceError::configuration(
                location().at_line(err.line()),
                format!("malformed API description: {err}"),
            )
        })?,
        SpecFormat::Yaml => serde_yaml_ng::from_str(source).map_err(|err| {
            let mut at = location();
            if let Some(mark) = err.location() {
                at = at.at_line(mark.line());
            }
            CovTraceError::configuration(at, format!("malformed API description: {err}"))
        })?,
    };

    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Err(CovTraceError::configuration(
            location(),
            "API description has no `paths` object",
        ));
    };
    let base_path = document
        .get("swagger")
        .and(document.get("basePath"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let template = normalize_path_template(&format!("{base_path}/{path}"));
        for (name, method) in OPERATION_METHODS {
            let Some(operation) = item.get(name) else {
                continue;
            };
            let key = match operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
            {
                Some(id) => format!("{method}_{id}"),
                None => format!("{method}_{}", derived_name(path)),
            };
            endpoints.push(Endpoint {
                key,
                method,
                path_segments: path_segments(&template),
                path_template: template.clone(),
            });
        }
    }

    log::debug!("parsed {} operations from API description", endpoints.len());
    Ok(endpoints)
}

/// Read an API description and register its operations.
pub fn load_registry<F: FileSystem>(fs: &F, path: &Path) -> Result<EndpointRegistry> {
    let source = fs.read_to_string(path)?;
    let endpoints = parse_spec(&source, SpecFormat::from_path(path), Some(path))?;
    EndpointRegistry::from_endpoints(endpoints).map_err(|err| match err {
        CovTraceError::DuplicateKey {
            key,
            existing,
            incoming,
        } => CovTraceError::configuration(
            SourceLocation::file(path),
            format!("endpoint key {key} is used by both {existing} and {incoming}"),
        ),
        other => other,
    })
}

fn derived_name(path: &str) -> String {
    let mut name = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let parameter = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .or_else(|| segment.strip_prefix(':'));
        match parameter {
            Some(parameter) => {
                name.push_str("By");
                name.push_str(&pascal_case(parameter));
            }
            None => name.push_str(&pascal_case(segment)),
        }
    }
    if name.is_empty() {
        name.push_str("Root");
    }
    name
}

fn pascal_case(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SpecFormat, derived_name, load_registry, parse_spec};
    use crate::domain::HttpMethod;
    use crate::fs::MockFileSystem;
    use std::path::Path;

    const OPENAPI: &str = r#"
openapi: 3.0.1
info:
  title: Customers
  version: "1"
paths:
  /customers:
    post:
      operationId: CreateCustomer
    get:
      summary: list
  /customers/{id}:
    parameters:
      - name: id
        in: path
    get:
      operationId: CustomerById
    patch:
      summary: no id
"#;

    #[test]
    fn openapi_operations_get_stable_keys() {
        let endpoints = parse_spec(OPENAPI, SpecFormat::Yaml, None).expect("parse");
        let keys: Vec<_> = endpoints.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "GET_Customers",
                "POST_CreateCustomer",
                "GET_CustomerById",
                "PATCH_CustomersById"
            ]
        );
        assert_eq!(endpoints[2].path_template, "/customers/{id}");
        assert_eq!(endpoints[2].method, HttpMethod::Get);
        assert_eq!(endpoints[2].path_segments, vec!["customers".to_string()]);
    }

    #[test]
    fn swagger_base_path_is_prefixed() {
        let swagger = r#"{
            "swagger": "2.0",
            "basePath": "/api/v1/",
            "paths": { "/orders/{orderId}/items": { "delete": {} } }
        }"#;
        let endpoints = parse_spec(swagger, SpecFormat::Json, None).expect("parse");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].key, "DELETE_OrdersByOrderIdItems");
        assert_eq!(endpoints[0].path_template, "/api/v1/orders/{orderId}/items");
        assert_eq!(
            endpoints[0].path_segments,
            vec!["items".to_string(), "orders".to_string()]
        );
    }

    #[test]
    fn malformed_documents_are_configuration_errors() {
        let error = parse_spec("{\n  \"paths\": [", SpecFormat::Json, Some(Path::new("api.json")))
            .expect_err("malformed");
        assert!(error.is_configuration());
        assert!(error.to_string().contains("api.json"));

        let error = parse_spec("openapi: 3.0.0\n", SpecFormat::Yaml, None).expect_err("no paths");
        assert!(error.to_string().contains("paths"));
    }

    #[test]
    fn conflicting_operation_ids_fail_registration() {
        let spec = "paths:\n  /a:\n    get:\n      operationId: Thing\n  /b:\n    get:\n      operationId: Thing\n";
        let mut fs = MockFileSystem::new();
        fs.expect_read_to_string()
            .returning(move |_| Ok(spec.to_string()));

        let error = load_registry(&fs, Path::new("api.yaml")).expect_err("duplicate");
        assert!(error.is_configuration());
        assert!(error.to_string().contains("GET_Thing"));
    }

    #[test]
    fn derived_names_use_pascal_case_and_by_prefix() {
        assert_eq!(derived_name("/customer-accounts/{account_id}"), "CustomerAccountsByAccountId");
        assert_eq!(derived_name("/"), "Root");
        assert_eq!(SpecFormat::from_path(Path::new("spec.JSON")), SpecFormat::Json);
    }
}
