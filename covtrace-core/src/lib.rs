#![deny(missing_docs)]
//! covtrace core library.
//!
//! Traces a QA-authored catalogue of API test scenarios to the unit tests of
//! a codebase and reports per-endpoint coverage, ranked gaps and orphans.

pub mod analysis;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fs;
pub mod gaps;
pub mod oracle;
/// Phase 1 and Phase 2 coverage views.
pub mod phases;
pub mod registry;
pub mod report;
pub mod spec_parser;
pub mod test_index;

pub use analysis::{AnalysisInput, analyze};
pub use cache::OracleCache;
pub use catalogue::{EntryState, ScenarioCatalogue, load_catalogue};
pub use config::AnalysisConfig;
pub use coordinator::{MatchCoordinator, VerdictSet, aggregate_verdict};
pub use discovery::TestDiscovery;
pub use domain::{
    Confidence, Coverage, Endpoint, HttpMethod, MatchVerdict, Priority, Scenario,
    ScenarioCategory, SourceKind, TestMatch, UnitTest,
};
pub use error::{CovTraceError, Result, SourceLocation};
pub use fs::{FileSystem, StdFileSystem};
pub use gaps::{Gap, GapKind, OrphanApi, OrphanClass, OrphanTest, sort_ranked};
pub use oracle::{
    MatchOracle, OracleFuture, OracleMatch, OracleRequest, OracleResponse, ReplayOracle,
    ReplayRecord,
};
pub use phases::{CompletenessView, EndpointCoverage, Suggestion};
pub use registry::EndpointRegistry;
pub use report::{
    CoverageResult, CoverageSummary, PriorityCount, render_json, report_schema_json,
};
pub use spec_parser::{SpecFormat, load_registry, parse_spec};
pub use test_index::{SharedAttribution, TestIndex};
