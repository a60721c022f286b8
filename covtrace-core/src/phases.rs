//! Phase 1 (baseline vs tests) and Phase 2 (baseline vs AI suggestions).
//!
//! The phases never share a number: Phase 1 lives in [`EndpointCoverage`],
//! Phase 2 in the separate [`CompletenessView`] map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::catalogue::ScenarioCatalogue;
use crate::coordinator::VerdictSet;
use crate::domain::{Coverage, Endpoint, MatchVerdict, Scenario};
use crate::gaps::is_orphan_api;
use crate::registry::EndpointRegistry;
use crate::test_index::TestIndex;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "be", "by", "for", "in", "is", "it", "of", "on", "or",
    "should", "that", "the", "to", "when", "with",
];

/// Phase 1 result for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCoverage {
    /// The endpoint.
    pub endpoint: Endpoint,
    /// Baseline scenarios for the endpoint.
    pub baseline_count: usize,
    /// Tests attributed to the endpoint.
    pub test_count: usize,
    /// Scenarios with a `FULL` verdict.
    pub full_count: usize,
    /// Scenarios with a `PARTIAL` verdict.
    pub partial_count: usize,
    /// Scenarios with a `NONE` verdict.
    pub none_count: usize,
    /// `full / baseline`; absent without baseline scenarios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase1_coverage: Option<f64>,
    /// Every baseline scenario is `FULL` and there is at least one.
    pub fully_covered: bool,
    /// No baseline scenarios and no tests.
    pub orphan: bool,
    /// Verdicts in catalogue order.
    pub verdicts: Vec<MatchVerdict>,
}

/// An AI scenario not already expressed by the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// The AI-suggested scenario.
    pub scenario: Scenario,
    /// Security or error-handling scenario.
    pub high_priority: bool,
}

/// Phase 2 result for one endpoint. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessView {
    /// Endpoint key.
    pub endpoint_key: String,
    /// Baseline scenarios for the endpoint.
    pub baseline_count: usize,
    /// AI-suggested scenarios for the endpoint.
    pub suggested_count: usize,
    /// AI scenarios already expressed by a baseline scenario.
    pub overlap_count: usize,
    /// `overlap / suggested`; absent without AI scenarios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase2_coverage: Option<f64>,
    /// Non-overlapping AI scenarios in catalogue order.
    pub suggestions: Vec<Suggestion>,
}

/// Phase 1 view per registered endpoint, in key order.
pub fn endpoint_coverage(
    registry: &EndpointRegistry,
    baseline: &ScenarioCatalogue,
    index: &TestIndex,
    verdicts: &VerdictSet,
) -> BTreeMap<String, EndpointCoverage> {
    registry
        .iter()
        .map(|endpoint| {
            let verdicts = verdicts.get(&endpoint.key).cloned().unwrap_or_default();
            let count =
                |coverage: Coverage| verdicts.iter().filter(|v| v.coverage == coverage).count();
            let baseline_count = baseline.count(&endpoint.key);
            let full_count = count(Coverage::Full);
            let view = EndpointCoverage {
                endpoint: endpoint.clone(),
                baseline_count,
                test_count: index.count_for(&endpoint.key),
                full_count,
                partial_count: count(Coverage::Partial),
                none_count: count(Coverage::None),
                phase1_coverage: ratio(full_count, baseline_count),
                fully_covered: baseline_count > 0 && full_count == baseline_count,
                orphan: is_orphan_api(&endpoint.key, baseline, index),
                verdicts,
            };
            (endpoint.key.clone(), view)
        })
        .collect()
}

/// Phase 2 view per registered endpoint, in key order.
///
/// An AI scenario overlaps when a baseline scenario of the same endpoint and
/// category has the same normalized text, or a token Jaccard similarity of at
/// least `threshold`.
pub fn completeness(
    registry: &EndpointRegistry,
    baseline: &ScenarioCatalogue,
    suggested: &ScenarioCatalogue,
    threshold: f64,
) -> BTreeMap<String, CompletenessView> {
    registry
        .iter()
        .map(|endpoint| {
            let known: Vec<(&Scenario, BTreeSet<String>)> = baseline
                .scenarios_for(&endpoint.key)
                .iter()
                .map(|scenario| (scenario, tokens(&scenario.text)))
                .collect();
            let proposed = suggested.scenarios_for(&endpoint.key);

            let mut overlap_count = 0;
            let mut suggestions = Vec::new();
            for scenario in proposed {
                let words = tokens(&scenario.text);
                let overlaps = known.iter().any(|(base, base_words)| {
                    base.category == scenario.category
                        && (normalized(&base.text) == normalized(&scenario.text)
                            || jaccard(base_words, &words) >= threshold)
                });
                if overlaps {
                    overlap_count += 1;
                } else {
                    suggestions.push(Suggestion {
                        scenario: scenario.clone(),
                        high_priority: scenario.category.is_high_risk(),
                    });
                }
            }

            let view = CompletenessView {
                endpoint_key: endpoint.key.clone(),
                baseline_count: known.len(),
                suggested_count: proposed.len(),
                overlap_count,
                phase2_coverage: ratio(overlap_count, proposed.len()),
                suggestions,
            };
            (endpoint.key.clone(), view)
        })
        .collect()
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

fn normalized(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::{completeness, endpoint_coverage, jaccard, tokens};
    use crate::catalogue::ScenarioCatalogue;
    use crate::config::AnalysisConfig;
    use crate::domain::{
        Confidence, Coverage, HttpMethod, MatchVerdict, Priority, Scenario, ScenarioCategory,
        SourceKind,
    };
    use crate::registry::EndpointRegistry;
    use crate::test_index::TestIndex;
    use std::collections::BTreeMap;

    fn registry() -> EndpointRegistry {
        let mut registry = EndpointRegistry::new();
        registry
            .register("POST_CreateCustomer", HttpMethod::Post, "/customers")
            .expect("post");
        registry
    }

    fn scenario(category: ScenarioCategory, text: String, kind: SourceKind) -> Scenario {
        Scenario {
            endpoint_key: "POST_CreateCustomer".to_string(),
            category,
            text,
            source_kind: kind,
            priority: category.default_priority(),
        }
    }

    fn baseline_texts() -> Vec<String> {
        (0..10)
            .map(|i| format!("create customer variant {i} returns created"))
            .collect()
    }

    fn catalogues() -> (ScenarioCatalogue, ScenarioCatalogue) {
        let baseline = ScenarioCatalogue::from_scenarios(
            SourceKind::Baseline,
            baseline_texts()
                .into_iter()
                .map(|text| scenario(ScenarioCategory::HappyCase, text, SourceKind::Baseline)),
        );
        let overlapping = baseline_texts()
            .into_iter()
            .map(|text| scenario(ScenarioCategory::HappyCase, text, SourceKind::AiSuggested));
        let novel = (0..12).map(|i| {
            let category = if i % 2 == 0 {
                ScenarioCategory::Security
            } else {
                ScenarioCategory::EdgeCase
            };
            scenario(category, format!("unusual probe number {i}"), SourceKind::AiSuggested)
        });
        let suggested =
            ScenarioCatalogue::from_scenarios(SourceKind::AiSuggested, overlapping.chain(novel));
        (baseline, suggested)
    }

    fn all_full(baseline: &ScenarioCatalogue) -> BTreeMap<String, Vec<MatchVerdict>> {
        let verdicts = baseline
            .scenarios_for("POST_CreateCustomer")
            .iter()
            .map(|scenario| MatchVerdict {
                scenario: scenario.clone(),
                matched_tests: Vec::new(),
                coverage: Coverage::Full,
                confidence: Confidence::High,
                explanation: None,
            })
            .collect();
        BTreeMap::from([("POST_CreateCustomer".to_string(), verdicts)])
    }

    #[test]
    fn phases_are_computed_independently() {
        let (baseline, suggested) = catalogues();
        let registry = registry();
        let index = TestIndex::build(&registry, Vec::new(), &AnalysisConfig::default());

        let phase1 = endpoint_coverage(&registry, &baseline, &index, &all_full(&baseline));
        let view = &phase1["POST_CreateCustomer"];
        assert_eq!(view.baseline_count, 10);
        assert_eq!(view.full_count, 10);
        assert_eq!(view.phase1_coverage, Some(1.0));
        assert!(view.fully_covered);

        let phase2 = completeness(&registry, &baseline, &suggested, 0.5);
        let side = &phase2["POST_CreateCustomer"];
        assert_eq!(side.suggested_count, 22);
        assert_eq!(side.overlap_count, 10);
        assert_eq!(side.phase2_coverage, Some(10.0 / 22.0));
        assert_eq!(side.suggestions.len(), 12);
        assert_eq!(
            side.suggestions.iter().filter(|s| s.high_priority).count(),
            6
        );

        let fewer = ScenarioCatalogue::from_scenarios(
            SourceKind::AiSuggested,
            suggested.scenarios_for("POST_CreateCustomer")[..5].to_vec(),
        );
        let changed = completeness(&registry, &baseline, &fewer, 0.5);
        assert_eq!(changed["POST_CreateCustomer"].phase2_coverage, Some(1.0));
        let again = endpoint_coverage(&registry, &baseline, &index, &all_full(&baseline));
        assert_eq!(again, phase1);
    }

    #[test]
    fn scenarios_without_tests_are_zero_percent_not_orphan() {
        let (baseline, _) = catalogues();
        let registry = registry();
        let index = TestIndex::build(&registry, Vec::new(), &AnalysisConfig::default());
        let verdicts = BTreeMap::from([(
            "POST_CreateCustomer".to_string(),
            baseline
                .scenarios_for("POST_CreateCustomer")
                .iter()
                .map(|scenario| MatchVerdict {
                    scenario: scenario.clone(),
                    matched_tests: Vec::new(),
                    coverage: Coverage::None,
                    confidence: Confidence::Low,
                    explanation: None,
                })
                .collect(),
        )]);

        let views = endpoint_coverage(&registry, &baseline, &index, &verdicts);
        let view = &views["POST_CreateCustomer"];
        assert_eq!(view.phase1_coverage, Some(0.0));
        assert!(!view.fully_covered);
        assert!(!view.orphan);
        assert_eq!(view.none_count, 10);
    }

    #[test]
    fn empty_baseline_has_no_ratio_and_is_never_fully_covered() {
        let registry = registry();
        let baseline = ScenarioCatalogue::empty(SourceKind::Baseline);
        let suggested = ScenarioCatalogue::empty(SourceKind::AiSuggested);
        let index = TestIndex::build(&registry, Vec::new(), &AnalysisConfig::default());

        let views = endpoint_coverage(&registry, &baseline, &index, &BTreeMap::new());
        let view = &views["POST_CreateCustomer"];
        assert_eq!(view.phase1_coverage, None);
        assert!(!view.fully_covered);
        assert!(view.orphan);
        let sides = completeness(&registry, &baseline, &suggested, 0.5);
        assert_eq!(sides["POST_CreateCustomer"].phase2_coverage, None);
    }

    #[test]
    fn overlap_requires_same_category() {
        let registry = registry();
        let baseline = ScenarioCatalogue::from_scenarios(
            SourceKind::Baseline,
            [scenario(
                ScenarioCategory::ErrorCase,
                "Missing email returns 400".to_string(),
                SourceKind::Baseline,
            )],
        );
        let suggested = ScenarioCatalogue::from_scenarios(
            SourceKind::AiSuggested,
            [
                scenario(
                    ScenarioCategory::ErrorCase,
                    "missing email should return 400".to_string(),
                    SourceKind::AiSuggested,
                ),
                scenario(
                    ScenarioCategory::Security,
                    "Missing email returns 400".to_string(),
                    SourceKind::AiSuggested,
                ),
            ],
        );

        let sides = completeness(&registry, &baseline, &suggested, 0.5);
        let side = &sides["POST_CreateCustomer"];
        assert_eq!(side.overlap_count, 1);
        assert_eq!(side.suggestions.len(), 1);
        assert_eq!(side.suggestions[0].scenario.category, ScenarioCategory::Security);
        assert!(side.suggestions[0].high_priority);
        assert_eq!(side.suggestions[0].scenario.priority, Priority::P0);
    }

    #[test]
    fn tokens_drop_stop_words_and_case() {
        let a = tokens("Missing email returns 400");
        let b = tokens("missing EMAIL should return 400");
        assert!(a.contains("email") && !b.contains("should"));
        assert_eq!(jaccard(&a, &b), 0.6);
    }
}
