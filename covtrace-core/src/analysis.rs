//! The `analyze` entry point.

use std::sync::Arc;

use crate::cache::OracleCache;
use crate::catalogue::ScenarioCatalogue;
use crate::config::AnalysisConfig;
use crate::coordinator::MatchCoordinator;
use crate::domain::{SourceKind, UnitTest};
use crate::error::{CovTraceError, Result, SourceLocation};
use crate::gaps::{orphan_apis, orphan_tests, scenario_gaps};
use crate::oracle::MatchOracle;
use crate::phases::{completeness, endpoint_coverage};
use crate::registry::EndpointRegistry;
use crate::report::CoverageResult;
use crate::test_index::TestIndex;

/// Everything one run reads.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    /// Registered endpoints.
    pub endpoints: EndpointRegistry,
    /// QA-authored scenarios; binding.
    pub baseline: ScenarioCatalogue,
    /// AI-suggested scenarios; informational.
    pub suggested: ScenarioCatalogue,
    /// Discovered unit tests.
    pub tests: Vec<UnitTest>,
}

/// Compute the coverage result for one run.
///
/// Configuration problems fail before the oracle is called. Oracle failures
/// fail the whole run; no partial result is returned.
pub async fn analyze(
    input: AnalysisInput,
    oracle: Arc<dyn MatchOracle>,
    config: &AnalysisConfig,
    cache: Option<Arc<OracleCache>>,
) -> Result<CoverageResult> {
    let service = config.service.as_deref();
    check_inputs(&input, config).map_err(|err| err.with_service(service))?;

    let AnalysisInput {
        endpoints,
        baseline,
        suggested,
        tests,
    } = input;

    let index = TestIndex::build(&endpoints, tests, config);
    log::debug!(
        "indexed {} tests; {} unattributed",
        index.len(),
        index.unattributed().count()
    );

    let mut coordinator = MatchCoordinator::new(oracle, config);
    if let Some(cache) = cache {
        coordinator = coordinator.with_cache(cache);
    }
    let verdicts = coordinator
        .run(&endpoints, &baseline, &index)
        .await
        .map_err(|err| err.with_service(service))?;

    let result = CoverageResult {
        gaps: scenario_gaps(&verdicts),
        orphan_apis: orphan_apis(&endpoints, &baseline, &index),
        orphan_tests: orphan_tests(&index, &baseline, &config.technical_markers),
        shared_attributions: index.shared_attributions(),
        phase2: completeness(&endpoints, &baseline, &suggested, config.overlap_threshold),
        per_endpoint: endpoint_coverage(&endpoints, &baseline, &index, &verdicts),
    };

    let summary = result.summary();
    log::info!(
        "{}{} endpoints, {} fully covered, {} orphan APIs, {} gaps",
        service.map(|name| format!("{name}: ")).unwrap_or_default(),
        summary.endpoints,
        summary.fully_covered,
        summary.orphan_apis,
        result.gaps.len()
    );
    Ok(result)
}

fn check_inputs(input: &AnalysisInput, config: &AnalysisConfig) -> Result<()> {
    config.validate()?;
    for (catalogue, expected) in [
        (&input.baseline, SourceKind::Baseline),
        (&input.suggested, SourceKind::AiSuggested),
    ] {
        if catalogue.kind() != expected {
            return Err(CovTraceError::configuration(
                catalogue
                    .origin()
                    .map(SourceLocation::file)
                    .unwrap_or_default(),
                format!("expected the {expected} catalogue, got {}", catalogue.kind()),
            ));
        }
    }
    input.baseline.validate_against(&input.endpoints)?;
    for (key, line) in input.suggested.unknown_keys(&input.endpoints) {
        log::warn!(
            "ignoring AI-suggested scenarios for unknown endpoint {key}{}",
            line.map(|line| format!(" (line {line})")).unwrap_or_default()
        );
    }
    Ok(())
}
