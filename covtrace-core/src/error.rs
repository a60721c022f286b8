//! Error types for covtrace core.

use std::path::PathBuf;
use std::time::Duration;
use std::{error::Error, fmt, io};

/// Where a malformed or missing input was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Service whose inputs were being analyzed.
    pub service: Option<String>,
    /// File containing the offending input.
    pub file: Option<PathBuf>,
    /// One-based line number inside `file`.
    pub line: Option<usize>,
}

impl SourceLocation {
    /// Location pointing at a file, without a line.
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self {
            service: None,
            file: Some(file.into()),
            line: None,
        }
    }

    /// Attach a line number.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach the service name.
    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.service.is_none() && self.file.is_none() && self.line.is_none()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(service) = &self.service {
            parts.push(format!("service {service}"));
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => parts.push(format!("{}:{line}", file.display())),
            (Some(file), None) => parts.push(file.display().to_string()),
            (None, Some(line)) => parts.push(format!("line {line}")),
            (None, None) => {}
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Error type for covtrace core operations.
#[derive(Debug)]
pub enum CovTraceError {
    /// An underlying I/O error.
    Io(io::Error),
    /// An endpoint key was registered twice with different operations.
    DuplicateKey {
        /// The conflicting key.
        key: String,
        /// The operation already registered under `key`.
        existing: String,
        /// The operation that attempted to reuse `key`.
        incoming: String,
    },
    /// An endpoint key could not be resolved.
    UnknownEndpoint(String),
    /// Malformed or inconsistent input (catalogue, spec document, settings).
    Configuration {
        /// Where the problem was found.
        location: SourceLocation,
        /// What is wrong.
        message: String,
    },
    /// The semantic match oracle cannot be reached or is not configured.
    OracleUnavailable(String),
    /// An oracle call did not complete within the configured timeout.
    OracleTimeout {
        /// Endpoint being analyzed.
        endpoint_key: String,
        /// Scenario text sent to the oracle.
        scenario: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The oracle answered, but the answer breaks its contract.
    OracleContract {
        /// Endpoint being analyzed.
        endpoint_key: String,
        /// Scenario text sent to the oracle.
        scenario: String,
        /// What is wrong with the answer.
        message: String,
    },
    /// A catch-all error with a message.
    Other(String),
}

impl CovTraceError {
    /// Build a configuration error.
    pub fn configuration(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Configuration {
            location,
            message: message.into(),
        }
    }

    /// Whether the error stems from untrustworthy input rather than the oracle.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey { .. } | Self::UnknownEndpoint(_) | Self::Configuration { .. }
        )
    }

    /// Attach a service name to configuration errors that lack one.
    pub fn with_service(self, service: Option<&str>) -> Self {
        match (self, service) {
            (Self::Configuration { location, message }, Some(service))
                if location.service.is_none() =>
            {
                Self::Configuration {
                    location: location.for_service(service),
                    message,
                }
            }
            (other, _) => other,
        }
    }
}

impl fmt::Display for CovTraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::DuplicateKey {
                key,
                existing,
                incoming,
            } => write!(
                f,
                "duplicate endpoint key {key}: already registered as {existing}, cannot reuse for {incoming}"
            ),
            Self::UnknownEndpoint(key) => write!(f, "unknown endpoint key: {key}"),
            Self::Configuration { location, message } if location.is_empty() => {
                write!(f, "configuration error: {message}")
            }
            Self::Configuration { location, message } => {
                write!(f, "configuration error ({location}): {message}")
            }
            Self::OracleUnavailable(reason) => write!(f, "match oracle unavailable: {reason}"),
            Self::OracleTimeout {
                endpoint_key,
                scenario,
                timeout,
            } => write!(
                f,
                "match oracle timed out after {}s for {endpoint_key} scenario \"{scenario}\"",
                timeout.as_secs_f64()
            ),
            Self::OracleContract {
                endpoint_key,
                scenario,
                message,
            } => write!(
                f,
                "match oracle returned an invalid answer for {endpoint_key} scenario \"{scenario}\": {message}"
            ),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CovTraceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CovTraceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Convenience result type for covtrace core.
pub type Result<T> = std::result::Result<T, CovTraceError>;
