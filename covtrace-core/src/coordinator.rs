//! Per-scenario coverage verdicts from oracle answers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::OracleCache;
use crate::catalogue::ScenarioCatalogue;
use crate::config::AnalysisConfig;
use crate::domain::{Confidence, Coverage, MatchVerdict, Scenario, TestMatch, UnitTest};
use crate::error::{CovTraceError, Result};
use crate::oracle::{MatchOracle, OracleRequest, OracleResponse};
use crate::registry::EndpointRegistry;
use crate::test_index::TestIndex;

/// Verdicts per endpoint key, in catalogue order within each endpoint.
pub type VerdictSet = BTreeMap<String, Vec<MatchVerdict>>;

/// Drives oracle calls for every baseline scenario and folds the answers into verdicts.
pub struct MatchCoordinator {
    oracle: Arc<dyn MatchOracle>,
    cache: Option<Arc<OracleCache>>,
    timeout: Duration,
    concurrency: usize,
}

impl MatchCoordinator {
    /// Create a coordinator using the run's timeout and concurrency settings.
    pub fn new(oracle: Arc<dyn MatchOracle>, config: &AnalysisConfig) -> Self {
        Self {
            oracle,
            cache: None,
            timeout: config.oracle_timeout,
            concurrency: config.effective_concurrency(),
        }
    }

    /// Serve repeated requests from, and record answers into, `cache`.
    pub fn with_cache(mut self, cache: Arc<OracleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Produce exactly one verdict per baseline scenario of every registered endpoint.
    ///
    /// Fails on the first oracle error; remaining calls are aborted and no
    /// partial verdict set is returned.
    pub async fn run(
        &self,
        registry: &EndpointRegistry,
        baseline: &ScenarioCatalogue,
        index: &TestIndex,
    ) -> Result<VerdictSet> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut slots: BTreeMap<String, Vec<Option<MatchVerdict>>> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for endpoint in registry.iter() {
            let scenarios = baseline.scenarios_for(&endpoint.key);
            let candidates: Vec<UnitTest> =
                index.tests_for(&endpoint.key).into_iter().cloned().collect();
            let slot = slots
                .entry(endpoint.key.clone())
                .or_insert_with(|| vec![None; scenarios.len()]);

            for (position, scenario) in scenarios.iter().enumerate() {
                if candidates.is_empty() {
                    slot[position] = Some(uncovered(scenario.clone()));
                    continue;
                }
                let request = OracleRequest {
                    endpoint_key: endpoint.key.clone(),
                    scenario: scenario.clone(),
                    candidates: candidates.clone(),
                };
                if let Some(cached) = self.cache.as_ref().and_then(|cache| cache.get(&request)) {
                    log::debug!("oracle cache hit for {} \"{}\"", endpoint.key, scenario.text);
                    slot[position] = Some(aggregate_verdict(&request, cached)?);
                    continue;
                }

                let oracle = Arc::clone(&self.oracle);
                let semaphore = Arc::clone(&semaphore);
                let timeout = self.timeout;
                tasks.spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => call_oracle(oracle.as_ref(), &request, timeout).await,
                        Err(err) => Err(CovTraceError::Other(format!(
                            "oracle scheduling failed: {err}"
                        ))),
                    };
                    (position, request, outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (position, request, outcome) = match joined {
                Ok(result) => result,
                Err(err) => {
                    tasks.abort_all();
                    return Err(CovTraceError::Other(format!("oracle task failed: {err}")));
                }
            };
            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            };
            if let Some(cache) = &self.cache {
                cache.insert(&request, response.clone());
            }
            let verdict = match aggregate_verdict(&request, response) {
                Ok(verdict) => verdict,
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            };
            if let Some(slot) = slots
                .get_mut(&request.endpoint_key)
                .and_then(|slot| slot.get_mut(position))
            {
                *slot = Some(verdict);
            }
        }

        slots
            .into_iter()
            .map(|(key, slot)| {
                let verdicts = slot.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
                    CovTraceError::Other(format!("missing scenario verdict for {key}"))
                })?;
                Ok((key, verdicts))
            })
            .collect()
    }
}

async fn call_oracle(
    oracle: &dyn MatchOracle,
    request: &OracleRequest,
    timeout: Duration,
) -> Result<OracleResponse> {
    log::debug!(
        "matching {} \"{}\" against {} candidate tests",
        request.endpoint_key,
        request.scenario.text,
        request.candidates.len()
    );
    match tokio::time::timeout(timeout, oracle.match_scenario(request)).await {
        Ok(result) => result,
        Err(_) => Err(CovTraceError::OracleTimeout {
            endpoint_key: request.endpoint_key.clone(),
            scenario: request.scenario.text.clone(),
            timeout,
        }),
    }
}

fn uncovered(scenario: Scenario) -> MatchVerdict {
    MatchVerdict {
        scenario,
        matched_tests: Vec::new(),
        coverage: Coverage::None,
        confidence: Confidence::Low,
        explanation: None,
    }
}

/// Fold an oracle answer into a verdict.
///
/// Matches naming tests outside the request's candidates are dropped. The
/// verdict is `FULL` when some match is full with at least `MEDIUM`
/// confidence, `PARTIAL` when anything else matched, `NONE` otherwise. A
/// `PARTIAL` verdict must carry an explanation; an answer that cannot supply
/// one is rejected.
pub fn aggregate_verdict(
    request: &OracleRequest,
    response: OracleResponse,
) -> Result<MatchVerdict> {
    let candidates: BTreeMap<&str, &UnitTest> = request
        .candidates
        .iter()
        .map(|test| (test.id.as_str(), test))
        .collect();

    let mut seen = BTreeSet::new();
    let mut matched: Vec<(TestMatch, Option<String>)> = Vec::new();
    for found in response.matches {
        if found.coverage == Coverage::None {
            continue;
        }
        let Some(test) = candidates.get(found.test_id.as_str()) else {
            log::warn!(
                "dropping oracle match {} for {}: not a candidate of this endpoint",
                found.test_id,
                request.endpoint_key
            );
            continue;
        };
        if !seen.insert(found.test_id.clone()) {
            continue;
        }
        let explanation = found
            .explanation
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        matched.push((
            TestMatch {
                test: (*test).clone(),
                confidence: found.confidence,
                coverage: found.coverage,
            },
            explanation,
        ));
    }

    matched.sort_by(|(a, _), (b, _)| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| a.test.file_path.cmp(&b.test.file_path))
            .then_with(|| a.test.line_number.cmp(&b.test.line_number))
            .then_with(|| a.test.id.cmp(&b.test.id))
    });

    let full = matched
        .iter()
        .any(|(m, _)| m.coverage == Coverage::Full && m.confidence >= Confidence::Medium);
    let coverage = if full {
        Coverage::Full
    } else if matched.is_empty() {
        Coverage::None
    } else {
        Coverage::Partial
    };
    let confidence = matched
        .first()
        .map(|(m, _)| m.confidence)
        .unwrap_or(Confidence::Low);

    let explanations: Vec<&str> = matched
        .iter()
        .filter_map(|(_, explanation)| explanation.as_deref())
        .collect();
    let mut explanation = (!explanations.is_empty()).then(|| explanations.join("; "));
    if coverage == Coverage::Partial && explanation.is_none() {
        if matched.iter().any(|(m, _)| m.coverage == Coverage::Full) {
            explanation = Some(
                "matching tests were judged complete only with LOW confidence".to_string(),
            );
        } else {
            return Err(CovTraceError::OracleContract {
                endpoint_key: request.endpoint_key.clone(),
                scenario: request.scenario.text.clone(),
                message: "partial match without an explanation of what is missing".to_string(),
            });
        }
    }

    Ok(MatchVerdict {
        scenario: request.scenario.clone(),
        matched_tests: matched.into_iter().map(|(m, _)| m).collect(),
        coverage,
        confidence,
        explanation,
    })
}
