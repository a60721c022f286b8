//! The immutable result of one analysis run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::catalogue::EntryState;
use crate::domain::{
    Confidence, Coverage, Endpoint, HttpMethod, MatchVerdict, Priority, Scenario,
    ScenarioCategory, SourceKind, TestMatch, UnitTest,
};
use crate::error::{CovTraceError, Result};
use crate::gaps::{Gap, GapKind, OrphanApi, OrphanClass, OrphanTest};
use crate::phases::{CompletenessView, EndpointCoverage, Suggestion};
use crate::test_index::SharedAttribution;

/// Coverage verdicts, gaps and orphans for one run.
///
/// Phase 1 numbers live in `per_endpoint`; Phase 2 lives only in `phase2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResult {
    /// Phase 1 view keyed by endpoint key.
    pub per_endpoint: BTreeMap<String, EndpointCoverage>,
    /// Uncovered and partial scenarios, ranked.
    pub gaps: Vec<Gap>,
    /// Endpoints with neither scenarios nor tests, ranked.
    pub orphan_apis: Vec<OrphanApi>,
    /// Business orphans ranked, then technical orphans.
    pub orphan_tests: Vec<OrphanTest>,
    /// Tests counted as candidates for several endpoints.
    pub shared_attributions: Vec<SharedAttribution>,
    /// Phase 2 view keyed by endpoint key.
    pub phase2: BTreeMap<String, CompletenessView>,
}

/// Gap count for one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriorityCount {
    /// Priority.
    pub priority: Priority,
    /// Gaps with that priority.
    pub count: usize,
}

/// Headline numbers of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    /// Registered endpoints.
    pub endpoints: usize,
    /// Endpoints whose every baseline scenario is `FULL`.
    pub fully_covered: usize,
    /// Orphan endpoints.
    pub orphan_apis: usize,
    /// Business orphan tests.
    pub business_orphan_tests: usize,
    /// Technical orphan tests.
    pub technical_orphan_tests: usize,
    /// Baseline scenarios across all endpoints.
    pub baseline_scenarios: usize,
    /// Baseline scenarios with a `FULL` verdict.
    pub full_scenarios: usize,
    /// `full / baseline` over all endpoints; absent without baseline scenarios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase1_coverage: Option<f64>,
    /// Gap counts for P0 through P3.
    pub gaps_by_priority: Vec<PriorityCount>,
}

impl CoverageResult {
    /// Totals over the whole run.
    pub fn summary(&self) -> CoverageSummary {
        let baseline_scenarios = self.per_endpoint.values().map(|e| e.baseline_count).sum();
        let full_scenarios = self.per_endpoint.values().map(|e| e.full_count).sum();
        let business_orphan_tests = self
            .orphan_tests
            .iter()
            .filter(|orphan| orphan.class == OrphanClass::Business)
            .count();
        CoverageSummary {
            endpoints: self.per_endpoint.len(),
            fully_covered: self.per_endpoint.values().filter(|e| e.fully_covered).count(),
            orphan_apis: self.orphan_apis.len(),
            business_orphan_tests,
            technical_orphan_tests: self.orphan_tests.len() - business_orphan_tests,
            baseline_scenarios,
            full_scenarios,
            phase1_coverage: (baseline_scenarios > 0)
                .then(|| full_scenarios as f64 / baseline_scenarios as f64),
            gaps_by_priority: Priority::ALL
                .iter()
                .map(|&priority| PriorityCount {
                    priority,
                    count: self.gaps.iter().filter(|gap| gap.priority == priority).count(),
                })
                .collect(),
        }
    }
}

/// Pretty JSON for persistence; equal results yield identical bytes.
pub fn render_json(result: &CoverageResult) -> Result<String> {
    serde_json::to_string_pretty(result)
        .map_err(|err| CovTraceError::Other(format!("failed to serialize report: {err}")))
}

#[derive(OpenApi)]
#[openapi(components(schemas(
    CoverageResult,
    CoverageSummary,
    PriorityCount,
    EndpointCoverage,
    CompletenessView,
    Suggestion,
    Gap,
    GapKind,
    OrphanApi,
    OrphanTest,
    OrphanClass,
    SharedAttribution,
    EntryState,
    Endpoint,
    HttpMethod,
    Scenario,
    ScenarioCategory,
    SourceKind,
    Priority,
    UnitTest,
    MatchVerdict,
    TestMatch,
    Coverage,
    Confidence
)))]
/// Component schemas of the report JSON.
struct ReportSchema;

/// OpenAPI document holding the JSON schema of [`CoverageResult`] and its parts.
pub fn report_schema_json() -> Result<String> {
    ReportSchema::openapi()
        .to_pretty_json()
        .map_err(|err| CovTraceError::Other(format!("failed to serialize report schema: {err}")))
}
