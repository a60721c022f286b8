//! Semantic match oracle boundary.
//!
//! The oracle decides whether candidate tests exercise a scenario. covtrace
//! only consumes its answers; [`ReplayOracle`] serves recorded answers so runs
//! can be reproduced without a live service.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::{Confidence, Coverage, Scenario, UnitTest};
use crate::error::{CovTraceError, Result, SourceLocation};

/// One scenario and the tests that may cover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    /// Endpoint the scenario belongs to.
    pub endpoint_key: String,
    /// Baseline scenario to match.
    pub scenario: Scenario,
    /// Tests attributed to the endpoint.
    pub candidates: Vec<UnitTest>,
}

/// The oracle's judgement of one candidate test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleMatch {
    /// Id of a test from the request's candidates.
    pub test_id: String,
    /// How sure the oracle is.
    pub confidence: Confidence,
    /// Whether the test exercises the whole scenario.
    pub coverage: Coverage,
    /// What the test misses, if anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Oracle answer for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Matching tests; empty when nothing matches.
    #[serde(default)]
    pub matches: Vec<OracleMatch>,
}

/// Boxed future returned by [`MatchOracle::match_scenario`].
pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = Result<OracleResponse>> + Send + 'a>>;

/// External semantic matcher.
///
/// Implementations fail with [`CovTraceError::OracleUnavailable`] when their
/// backing service or credentials are missing. Retries, if any, belong here
/// rather than in the engine.
pub trait MatchOracle: Send + Sync {
    /// Match one scenario against its candidate tests.
    fn match_scenario<'a>(&'a self, request: &'a OracleRequest) -> OracleFuture<'a>;
}

/// Recorded oracle answer, as stored in replay files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    /// Endpoint key of the request.
    pub endpoint_key: String,
    /// Scenario text of the request.
    pub scenario: String,
    /// Recorded matches.
    #[serde(default)]
    pub matches: Vec<OracleMatch>,
}

/// Deterministic oracle answering from recorded responses.
///
/// Requests without a recording get an empty answer.
#[derive(Debug, Clone, Default)]
pub struct ReplayOracle {
    responses: BTreeMap<(String, String), OracleResponse>,
}

impl ReplayOracle {
    /// An oracle with no recordings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of [`ReplayRecord`]s.
    pub fn from_json(raw: &str) -> Result<Self> {
        let records: Vec<ReplayRecord> = serde_json::from_str(raw).map_err(|err| {
            CovTraceError::configuration(
                SourceLocation {
                    line: Some(err.line()),
                    ..SourceLocation::default()
                },
                format!("malformed oracle replay file: {err}"),
            )
        })?;
        Ok(Self::from_records(records))
    }

    /// Build from records; a later record for the same scenario wins.
    pub fn from_records(records: impl IntoIterator<Item = ReplayRecord>) -> Self {
        let mut oracle = Self::new();
        for record in records {
            oracle.record(&record.endpoint_key, &record.scenario, record.matches);
        }
        oracle
    }

    /// Record the answer for a scenario.
    pub fn record(&mut self, endpoint_key: &str, scenario: &str, matches: Vec<OracleMatch>) {
        self.responses.insert(
            (endpoint_key.to_string(), scenario.to_string()),
            OracleResponse { matches },
        );
    }

    /// Builder form of [`ReplayOracle::record`].
    pub fn with(mut self, endpoint_key: &str, scenario: &str, matches: Vec<OracleMatch>) -> Self {
        self.record(endpoint_key, scenario, matches);
        self
    }

    /// Recorded answers, for writing replay files.
    pub fn records(&self) -> Vec<ReplayRecord> {
        self.responses
            .iter()
            .map(|((endpoint_key, scenario), response)| ReplayRecord {
                endpoint_key: endpoint_key.clone(),
                scenario: scenario.clone(),
                matches: response.matches.clone(),
            })
            .collect()
    }
}

impl MatchOracle for ReplayOracle {
    fn match_scenario<'a>(&'a self, request: &'a OracleRequest) -> OracleFuture<'a> {
        let key = (request.endpoint_key.clone(), request.scenario.text.clone());
        let response = self.responses.get(&key).cloned().unwrap_or_default();
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::{MatchOracle, OracleMatch, OracleRequest, ReplayOracle};
    use crate::domain::{Confidence, Coverage, Priority, Scenario, ScenarioCategory, SourceKind};

    fn request(text: &str) -> OracleRequest {
        OracleRequest {
            endpoint_key: "GET_Customer".to_string(),
            scenario: Scenario {
                endpoint_key: "GET_Customer".to_string(),
                category: ScenarioCategory::ErrorCase,
                text: text.to_string(),
                source_kind: SourceKind::Baseline,
                priority: Priority::P1,
            },
            candidates: Vec::new(),
        }
    }

    #[tokio::test]
    async fn replay_returns_recorded_matches_and_empty_otherwise() {
        let oracle = ReplayOracle::new().with(
            "GET_Customer",
            "Unknown id returns 404",
            vec![OracleMatch {
                test_id: "t1".to_string(),
                confidence: Confidence::High,
                coverage: Coverage::Full,
                explanation: None,
            }],
        );

        let hit = oracle
            .match_scenario(&request("Unknown id returns 404"))
            .await
            .expect("hit");
        assert_eq!(hit.matches.len(), 1);

        let miss = oracle
            .match_scenario(&request("Deleted id returns 410"))
            .await
            .expect("miss");
        assert!(miss.matches.is_empty());
    }

    #[test]
    fn replay_parses_json_records() {
        let raw = r#"[
            {"endpointKey": "GET_Customer", "scenario": "Unknown id returns 404",
             "matches": [{"testId": "t1", "confidence": "MEDIUM", "coverage": "PARTIAL",
                          "explanation": "does not assert the error body"}]},
            {"endpointKey": "GET_Customer", "scenario": "Returns 200"}
        ]"#;
        let oracle = ReplayOracle::from_json(raw).expect("replay");
        let records = oracle.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].matches[0].coverage, Coverage::Partial);
        assert!(records[0].matches.is_empty());
    }

    #[test]
    fn malformed_replay_is_a_configuration_error() {
        let error = ReplayOracle::from_json("{ not json").expect_err("malformed");
        assert!(error.is_configuration());
    }
}
