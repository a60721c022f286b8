//! Domain entities for covtrace.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// HTTP method of an API operation or a unit test.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl HttpMethod {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Parse a method name, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single API operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Unique identity, e.g. `POST_CreateCustomer`.
    pub key: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Normalized path template, display only.
    pub path_template: String,
    /// Lower-cased static path segments used for test attribution.
    pub path_segments: Vec<String>,
}

impl Endpoint {
    /// `METHOD /path` label.
    pub fn operation(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }
}

/// Kind of behavior a scenario describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCategory {
    /// Expected successful behavior.
    HappyCase,
    /// Boundary conditions.
    EdgeCase,
    /// Error handling and validation failures.
    ErrorCase,
    /// Authentication, authorization and abuse cases.
    Security,
}

impl ScenarioCategory {
    /// Catalogue spelling of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HappyCase => "happy_case",
            Self::EdgeCase => "edge_case",
            Self::ErrorCase => "error_case",
            Self::Security => "security",
        }
    }

    /// Parse a catalogue category name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "happy_case" | "happy" => Some(Self::HappyCase),
            "edge_case" | "edge" => Some(Self::EdgeCase),
            "error_case" | "error" => Some(Self::ErrorCase),
            "security" => Some(Self::Security),
            _ => None,
        }
    }

    /// Priority used when the catalogue does not give one.
    pub fn default_priority(&self) -> Priority {
        match self {
            Self::Security => Priority::P0,
            Self::HappyCase | Self::ErrorCase => Priority::P1,
            Self::EdgeCase => Priority::P2,
        }
    }

    /// Security and error-handling scenarios get flagged in completeness suggestions.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, Self::Security | Self::ErrorCase)
    }
}

impl fmt::Display for ScenarioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which catalogue a scenario came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Authored by QA; binding.
    Baseline,
    /// Proposed by an external generator; informational.
    AiSuggested,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::AiSuggested => f.write_str("ai_suggested"),
        }
    }
}

/// Gap priority. `P0` is the most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Priority {
    /// Critical.
    P0,
    /// High.
    P1,
    /// Medium.
    P2,
    /// Low.
    P3,
}

impl Priority {
    /// Parse `P0`..`P3`, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            _ => None,
        }
    }

    /// All priorities in sort order.
    pub const ALL: [Priority; 4] = [Self::P0, Self::P1, Self::P2, Self::P3];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        };
        f.write_str(label)
    }
}

/// An expected test case for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Endpoint the scenario belongs to.
    pub endpoint_key: String,
    /// Behavior category.
    pub category: ScenarioCategory,
    /// Human-authored description.
    pub text: String,
    /// Baseline or AI-suggested.
    pub source_kind: SourceKind,
    /// Priority carried into gaps.
    pub priority: Priority,
}

/// A unit test discovered in the codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitTest {
    /// Stable identifier, `path::name` by convention.
    pub id: String,
    /// Source file declaring the test.
    #[schema(value_type = String)]
    pub file_path: PathBuf,
    /// One-based line of the declaration.
    pub line_number: usize,
    /// Name as written in source (method name or description string).
    pub declared_name: String,
    /// Endpoint keys the parser believes the test targets; empty means unknown.
    #[serde(default)]
    pub endpoint_key_candidates: Vec<String>,
    /// Declared or parser-inferred HTTP method.
    #[serde(default)]
    pub method: Option<HttpMethod>,
}

/// Per-scenario coverage verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coverage {
    /// No test exercises the scenario.
    None,
    /// Some test touches the scenario but misses part of it.
    Partial,
    /// A test exercises the whole scenario.
    Full,
}

/// Match confidence reported by the oracle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    /// Weak signal.
    Low,
    /// Acceptable signal.
    Medium,
    /// Strong signal.
    High,
}

/// A test retained for a scenario, with the oracle's judgement of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestMatch {
    /// The matched test.
    pub test: UnitTest,
    /// Oracle confidence for this test.
    pub confidence: Confidence,
    /// Oracle coverage judgement for this test alone.
    pub coverage: Coverage,
}

/// Final coverage decision for one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchVerdict {
    /// The baseline scenario.
    pub scenario: Scenario,
    /// Matching tests, by descending confidence then file path.
    pub matched_tests: Vec<TestMatch>,
    /// Aggregated coverage.
    pub coverage: Coverage,
    /// Best confidence among matched tests; `LOW` when nothing matched.
    pub confidence: Confidence,
    /// What is missing. Always present for `PARTIAL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_total_order() {
        let mut priorities = vec![Priority::P2, Priority::P0, Priority::P3, Priority::P1];
        priorities.sort();
        assert_eq!(priorities, Priority::ALL.to_vec());
    }

    #[test]
    fn confidence_orders_low_to_high() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!(HttpMethod::parse("patch"), Some(HttpMethod::Patch));
        assert_eq!(HttpMethod::parse("TRACE"), None);
        assert_eq!(Priority::parse("p2"), Some(Priority::P2));
        assert_eq!(
            ScenarioCategory::parse("Error_Case"),
            Some(ScenarioCategory::ErrorCase)
        );
    }

    #[test]
    fn category_defaults_and_risk() {
        assert_eq!(ScenarioCategory::Security.default_priority(), Priority::P0);
        assert_eq!(ScenarioCategory::EdgeCase.default_priority(), Priority::P2);
        assert!(ScenarioCategory::ErrorCase.is_high_risk());
        assert!(!ScenarioCategory::HappyCase.is_high_risk());
    }

    #[test]
    fn serializes_wire_names() {
        let json = serde_json::to_string(&(Coverage::Partial, Confidence::High, HttpMethod::Get))
            .expect("json");
        assert_eq!(json, r#"["PARTIAL","HIGH","GET"]"#);
        let json = serde_json::to_string(&ScenarioCategory::HappyCase).expect("json");
        assert_eq!(json, r#""happy_case""#);
    }
}
