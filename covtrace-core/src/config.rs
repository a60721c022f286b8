//! Analysis settings.

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{CovTraceError, Result, SourceLocation};

/// Default timeout for a single oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of oracle calls in flight.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default token similarity for counting an AI scenario as already covered by baseline.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Tunables for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Service name used in error locations and logs.
    pub service: Option<String>,
    /// Timeout wrapped around every oracle call.
    pub oracle_timeout: Duration,
    /// Maximum concurrent oracle calls; `0` behaves as `1`.
    pub concurrency: usize,
    /// Jaccard threshold for Phase 2 overlap, in `0.0..=1.0`.
    pub overlap_threshold: f64,
    /// Name or path fragments that mark a partial update (PATCH) test.
    pub partial_update_markers: Vec<String>,
    /// Name or path fragments that mark a technical (non-business) test.
    pub technical_markers: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            service: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            partial_update_markers: to_strings(&["email", "partial"]),
            technical_markers: to_strings(&[
                "validator",
                "validation",
                "mapper",
                "converter",
                "serializer",
                "util",
                "helper",
                "dto",
                "config",
            ]),
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `COVTRACE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(service) = lookup("COVTRACE_SERVICE").filter(|value| !value.trim().is_empty())
        {
            config.service = Some(service.trim().to_string());
        }
        if let Some(value) = lookup("COVTRACE_ORACLE_TIMEOUT_SECS") {
            let secs: u64 = parse_setting("COVTRACE_ORACLE_TIMEOUT_SECS", &value)?;
            config.oracle_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("COVTRACE_CONCURRENCY") {
            config.concurrency = parse_setting("COVTRACE_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("COVTRACE_OVERLAP_THRESHOLD") {
            config.overlap_threshold = parse_setting("COVTRACE_OVERLAP_THRESHOLD", &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the oracle timeout.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(CovTraceError::configuration(
                SourceLocation::default(),
                format!(
                    "overlap threshold must be within 0.0..=1.0, got {}",
                    self.overlap_threshold
                ),
            ));
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(CovTraceError::configuration(
                SourceLocation::default(),
                format!(
                    "concurrency must be at most {}, got {}",
                    Semaphore::MAX_PERMITS,
                    self.concurrency
                ),
            ));
        }
        if self.oracle_timeout.is_zero() {
            return Err(CovTraceError::configuration(
                SourceLocation::default(),
                "oracle timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Concurrency clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, Semaphore::MAX_PERMITS)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CovTraceError::configuration(
            SourceLocation::default(),
            format!("{key} has invalid value \"{value}\""),
        )
    })
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::{AnalysisConfig, DEFAULT_CONCURRENCY};
    use tokio::sync::Semaphore;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = AnalysisConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AnalysisConfig::from_lookup(lookup(&[
            ("COVTRACE_SERVICE", " customers "),
            ("COVTRACE_ORACLE_TIMEOUT_SECS", "5"),
            ("COVTRACE_CONCURRENCY", "0"),
            ("COVTRACE_OVERLAP_THRESHOLD", "0.75"),
        ]))
        .expect("config");

        assert_eq!(config.service.as_deref(), Some("customers"));
        assert_eq!(config.oracle_timeout, Duration::from_secs(5));
        assert_eq!(config.effective_concurrency(), 1);
        assert_eq!(config.overlap_threshold, 0.75);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let error = AnalysisConfig::from_lookup(lookup(&[("COVTRACE_CONCURRENCY", "many")]))
            .expect_err("invalid");
        assert!(error.is_configuration());
        assert!(format!("{error}").contains("COVTRACE_CONCURRENCY"));

        assert!(
            AnalysisConfig::from_lookup(lookup(&[("COVTRACE_OVERLAP_THRESHOLD", "1.5")])).is_err()
        );
        assert!(
            AnalysisConfig::from_lookup(lookup(&[("COVTRACE_ORACLE_TIMEOUT_SECS", "0")])).is_err()
        );
    }

    #[test]
    fn concurrency_is_bounded_by_semaphore_capacity() {
        let too_many = (Semaphore::MAX_PERMITS + 1).to_string();
        let error =
            AnalysisConfig::from_lookup(lookup(&[("COVTRACE_CONCURRENCY", too_many.as_str())]))
                .expect_err("too many permits");
        assert!(error.is_configuration());
        assert!(format!("{error}").contains("concurrency"));

        let unchecked = AnalysisConfig::default().with_concurrency(usize::MAX);
        assert!(unchecked.validate().is_err());
        assert_eq!(unchecked.effective_concurrency(), Semaphore::MAX_PERMITS);
    }
}
