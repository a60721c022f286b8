//! Gaps, orphan APIs and orphan tests, with their priority ordering.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::catalogue::{EntryState, ScenarioCatalogue};
use crate::coordinator::VerdictSet;
use crate::domain::{Coverage, Endpoint, MatchVerdict, Priority, Scenario, UnitTest};
use crate::registry::EndpointRegistry;
use crate::test_index::TestIndex;

/// Priority given to endpoints with neither scenarios nor tests.
pub const ORPHAN_API_PRIORITY: Priority = Priority::P0;
/// Priority given to business tests that trace to no scenario.
pub const BUSINESS_ORPHAN_PRIORITY: Priority = Priority::P1;

/// Why a scenario is a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// No test covers the scenario.
    Uncovered,
    /// Tests cover part of the scenario.
    Partial,
}

/// A baseline scenario that is not fully covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    /// Uncovered or partial.
    pub kind: GapKind,
    /// Endpoint the scenario belongs to.
    pub endpoint_key: String,
    /// The scenario itself.
    pub scenario: Scenario,
    /// The scenario's priority.
    pub priority: Priority,
    /// What is missing.
    pub reason: String,
    /// What to do about it.
    pub recommendation: String,
}

/// An endpoint with no baseline scenarios and no attributable tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrphanApi {
    /// The endpoint.
    pub endpoint: Endpoint,
    /// How the endpoint appears in the baseline catalogue.
    pub catalogue_state: EntryState,
    /// Always [`ORPHAN_API_PRIORITY`].
    pub priority: Priority,
    /// Why it is orphaned.
    pub reason: String,
}

/// Whether an orphan test exercises business behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrphanClass {
    /// Exercises API behavior without a scenario to trace to.
    Business,
    /// Validators, mappers and other plumbing; informational only.
    Technical,
}

/// A test that traces to no baseline scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrphanTest {
    /// The test.
    pub test: UnitTest,
    /// Business or technical.
    pub class: OrphanClass,
    /// Endpoints the test was attributed to, all without baseline scenarios.
    pub endpoint_keys: Vec<String>,
    /// [`BUSINESS_ORPHAN_PRIORITY`] for business tests; absent for technical ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Why it is orphaned.
    pub reason: String,
}

/// Entries ordered by priority, then endpoint key, then subject text.
pub trait Ranked {
    /// Sort priority.
    fn rank(&self) -> Priority;
    /// First tie-breaker.
    fn endpoint_key(&self) -> &str;
    /// Second tie-breaker: scenario text, path template or test id.
    fn subject(&self) -> &str;
}

impl Ranked for Gap {
    fn rank(&self) -> Priority {
        self.priority
    }

    fn endpoint_key(&self) -> &str {
        &self.endpoint_key
    }

    fn subject(&self) -> &str {
        &self.scenario.text
    }
}

impl Ranked for OrphanApi {
    fn rank(&self) -> Priority {
        self.priority
    }

    fn endpoint_key(&self) -> &str {
        &self.endpoint.key
    }

    fn subject(&self) -> &str {
        &self.endpoint.path_template
    }
}

impl Ranked for OrphanTest {
    fn rank(&self) -> Priority {
        self.priority.unwrap_or(Priority::P3)
    }

    fn endpoint_key(&self) -> &str {
        self.endpoint_keys.first().map(String::as_str).unwrap_or("")
    }

    fn subject(&self) -> &str {
        &self.test.id
    }
}

/// Stable sort shared by every ranked list.
pub fn sort_ranked<T: Ranked>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.endpoint_key().cmp(b.endpoint_key()))
            .then_with(|| a.subject().cmp(b.subject()))
    });
}

/// One gap per `NONE` or `PARTIAL` verdict, ranked.
pub fn scenario_gaps(verdicts: &VerdictSet) -> Vec<Gap> {
    let mut gaps: Vec<Gap> = verdicts
        .iter()
        .flat_map(|(key, verdicts)| verdicts.iter().filter_map(move |v| gap_for(key, v)))
        .collect();
    sort_ranked(&mut gaps);
    gaps
}

fn gap_for(endpoint_key: &str, verdict: &MatchVerdict) -> Option<Gap> {
    let scenario = &verdict.scenario;
    let (kind, reason, recommendation) = match verdict.coverage {
        Coverage::Full => return None,
        Coverage::None => (
            GapKind::Uncovered,
            "No unit test covers this scenario".to_string(),
            format!(
                "Add a {} test for {endpoint_key} asserting: {}",
                scenario.category, scenario.text
            ),
        ),
        Coverage::Partial => {
            let tests: Vec<&str> = verdict
                .matched_tests
                .iter()
                .map(|m| m.test.declared_name.as_str())
                .collect();
            let missing = verdict.explanation.as_deref().unwrap_or("incomplete assertions");
            (
                GapKind::Partial,
                format!("Partially covered by {}: {missing}", tests.join(", ")),
                format!(
                    "Extend {} to fully assert: {}",
                    tests.first().copied().unwrap_or("the matching test"),
                    scenario.text
                ),
            )
        }
    };
    Some(Gap {
        kind,
        endpoint_key: endpoint_key.to_string(),
        scenario: scenario.clone(),
        priority: scenario.priority,
        reason,
        recommendation,
    })
}

/// Whether an endpoint is orphaned: zero baseline scenarios and zero tests.
pub fn is_orphan_api(endpoint_key: &str, baseline: &ScenarioCatalogue, index: &TestIndex) -> bool {
    baseline.count(endpoint_key) == 0 && index.count_for(endpoint_key) == 0
}

/// Orphaned endpoints, ranked.
pub fn orphan_apis(
    registry: &EndpointRegistry,
    baseline: &ScenarioCatalogue,
    index: &TestIndex,
) -> Vec<OrphanApi> {
    let mut orphans: Vec<OrphanApi> = registry
        .iter()
        .filter(|endpoint| is_orphan_api(&endpoint.key, baseline, index))
        .map(|endpoint| {
            let catalogue_state = baseline.state(&endpoint.key);
            let reason = match catalogue_state {
                EntryState::Absent => "Not listed in the baseline catalogue and no unit tests",
                EntryState::Commented => {
                    "Baseline entry is commented out and no unit tests exist"
                }
                _ => "Baseline entry has no scenarios and no unit tests exist",
            };
            OrphanApi {
                endpoint: endpoint.clone(),
                catalogue_state,
                priority: ORPHAN_API_PRIORITY,
                reason: reason.to_string(),
            }
        })
        .collect();
    sort_ranked(&mut orphans);
    orphans
}

/// Tests attributed to no endpoint, or only to endpoints without baseline
/// scenarios.
///
/// Business orphans come first in ranked order; technical orphans follow,
/// ordered by file path, line and id.
pub fn orphan_tests(
    index: &TestIndex,
    baseline: &ScenarioCatalogue,
    technical_markers: &[String],
) -> Vec<OrphanTest> {
    let mut business = Vec::new();
    let mut technical = Vec::new();

    for (test, keys) in index.attributed() {
        if keys.iter().any(|key| baseline.count(key) > 0) {
            continue;
        }
        let class = classify_orphan(test, technical_markers);
        let reason = match (class, keys.is_empty()) {
            (OrphanClass::Technical, _) => "Technical test outside the API surface".to_string(),
            (OrphanClass::Business, true) => "Not attributable to any endpoint".to_string(),
            (OrphanClass::Business, false) => format!(
                "Exercises {} which has no baseline scenarios",
                keys.join(", ")
            ),
        };
        let orphan = OrphanTest {
            test: test.clone(),
            class,
            endpoint_keys: keys.to_vec(),
            priority: (class == OrphanClass::Business).then_some(BUSINESS_ORPHAN_PRIORITY),
            reason,
        };
        match class {
            OrphanClass::Business => business.push(orphan),
            OrphanClass::Technical => technical.push(orphan),
        }
    }

    sort_ranked(&mut business);
    technical.sort_by(|a, b| {
        a.test
            .file_path
            .cmp(&b.test.file_path)
            .then(a.test.line_number.cmp(&b.test.line_number))
            .then_with(|| a.test.id.cmp(&b.test.id))
    });
    business.extend(technical);
    business
}

/// Technical when the test name or path carries a technical marker.
pub fn classify_orphan(test: &UnitTest, technical_markers: &[String]) -> OrphanClass {
    let text = format!("{} {}", test.declared_name, test.file_path.display()).to_lowercase();
    let technical = technical_markers
        .iter()
        .any(|marker| !marker.is_empty() && text.contains(&marker.to_lowercase()));
    if technical {
        OrphanClass::Technical
    } else {
        OrphanClass::Business
    }
}
