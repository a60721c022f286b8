#![deny(missing_docs)]
//! covtrace command-line interface.
//!
//! Runs a coverage analysis of QA scenario catalogues against a codebase's
//! unit tests and writes the report as text, Markdown or JSON.

mod oracle_http;
mod render;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use covtrace_core::{
    AnalysisConfig, AnalysisInput, CoverageResult, MatchOracle, OracleCache, ReplayOracle,
    ScenarioCatalogue, SourceKind, StdFileSystem, TestDiscovery, UnitTest, analyze,
    load_catalogue, load_registry, render_json, report_schema_json,
};
use oracle_http::HttpOracle;
use render::{render_markdown, render_text};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "covtrace", version, about = "Scenario coverage tracing for API test suites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("test_source")
        .required(true)
        .args(&["tests", "tests_json"])
))]
struct InputArgs {
    /// OpenAPI 3 or Swagger 2 description (JSON or YAML).
    #[arg(long)]
    spec: PathBuf,
    /// QA-authored baseline scenario catalogue.
    #[arg(long)]
    baseline: PathBuf,
    /// AI-suggested scenario catalogue (informational).
    #[arg(long)]
    suggestions: Option<PathBuf>,
    /// Source tree to scan for unit tests.
    #[arg(long)]
    tests: Option<PathBuf>,
    /// Pre-extracted unit tests as a JSON array.
    #[arg(long = "tests-json")]
    tests_json: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct OracleArgs {
    /// Answer oracle requests from a recorded replay file.
    #[arg(long = "oracle-replay")]
    oracle_replay: Option<PathBuf>,
    /// URL of the semantic match oracle.
    #[arg(long = "oracle-url", env = "COVTRACE_ORACLE_URL")]
    oracle_url: Option<String>,
    /// Bearer key for the semantic match oracle.
    #[arg(long = "oracle-key", env = "COVTRACE_ORACLE_KEY", hide_env_values = true)]
    oracle_key: Option<String>,
    /// Service name used in messages.
    #[arg(long)]
    service: Option<String>,
    /// Seconds to wait for each oracle call.
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,
    /// Maximum number of concurrent oracle calls.
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// Token overlap needed for an AI scenario to count as already in the baseline.
    #[arg(long = "overlap-threshold")]
    overlap_threshold: Option<f64>,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(long = "report-output")]
    report_output: Option<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace baseline scenarios to unit tests and report coverage gaps.
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        oracle: OracleArgs,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Print the JSON schema of the analysis report.
    Schema {
        /// Write the schema to a file instead of stdout.
        #[arg(long = "report-output")]
        report_output: Option<PathBuf>,
    },
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
fn main() {}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Analyze {
            input,
            oracle,
            report,
        } => run_analyze(input, oracle, report).await,
        Commands::Schema { report_output } => {
            emit_output(report_output.as_deref(), report_schema_json()?).await
        }
    }
}

async fn run_analyze(input: InputArgs, oracle: OracleArgs, report: OutputArgs) -> CliResult<()> {
    let config = resolve_config(AnalysisConfig::from_env()?, &oracle)?;
    let service = config.service.as_deref();
    let fs = StdFileSystem::new();

    let endpoints = load_registry(&fs, &input.spec).map_err(|err| err.with_service(service))?;
    let baseline = load_catalogue(&fs, &input.baseline, SourceKind::Baseline)
        .map_err(|err| err.with_service(service))?;
    let suggested = match &input.suggestions {
        Some(path) => load_catalogue(&fs, path, SourceKind::AiSuggested)
            .map_err(|err| err.with_service(service))?,
        None => ScenarioCatalogue::empty(SourceKind::AiSuggested),
    };
    let tests = match (&input.tests, &input.tests_json) {
        (_, Some(path)) => load_tests_json(path).await?,
        (Some(root), None) => TestDiscovery::new(StdFileSystem::new())?
            .with_registry(&endpoints)
            .discover(root)?,
        (None, None) => return Err("either --tests or --tests-json is required".into()),
    };
    log::info!(
        "loaded {} endpoints, {} baseline scenarios, {} tests",
        endpoints.len(),
        baseline.total(),
        tests.len()
    );

    let match_oracle = build_oracle(&oracle).await?;
    let cache = Arc::new(OracleCache::new());
    let result = analyze(
        AnalysisInput {
            endpoints,
            baseline,
            suggested,
            tests,
        },
        match_oracle,
        &config,
        Some(Arc::clone(&cache)),
    )
    .await?;
    log::debug!("oracle cache holds {} answers", cache.len());

    emit_report(&result, &report).await
}

fn resolve_config(base: AnalysisConfig, oracle: &OracleArgs) -> CliResult<AnalysisConfig> {
    let mut config = base;
    if let Some(service) = &oracle.service {
        config = config.with_service(service.clone());
    }
    if let Some(secs) = oracle.timeout_secs {
        config = config.with_oracle_timeout(Duration::from_secs(secs));
    }
    if let Some(concurrency) = oracle.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(threshold) = oracle.overlap_threshold {
        config.overlap_threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

async fn build_oracle(args: &OracleArgs) -> CliResult<Arc<dyn MatchOracle>> {
    if let Some(path) = &args.oracle_replay {
        let raw = tokio::fs::read_to_string(path).await?;
        let replay = ReplayOracle::from_json(&raw)
            .map_err(|err| format!("{}: {err}", path.display()))?;
        log::info!("answering oracle requests from {}", path.display());
        return Ok(Arc::new(replay));
    }
    let oracle = HttpOracle::new(args.oracle_url.clone(), args.oracle_key.clone())?;
    Ok(Arc::new(oracle))
}

async fn load_tests_json(path: &Path) -> CliResult<Vec<UnitTest>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let tests: Vec<UnitTest> = serde_json::from_str(&raw)
        .map_err(|err| format!("{}: malformed test list: {err}", path.display()))?;
    Ok(tests)
}

async fn emit_report(result: &CoverageResult, output: &OutputArgs) -> CliResult<()> {
    let contents = match output.format {
        OutputFormat::Text => render_text(result),
        OutputFormat::Json => render_json(result)?,
        OutputFormat::Markdown => render_markdown(result),
    };
    emit_output(output.report_output.as_deref(), contents).await
}

async fn emit_output(report_output: Option<&Path>, contents: String) -> CliResult<()> {
    if let Some(path) = report_output {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
    } else {
        print!("{contents}");
    }
    Ok(())
}
