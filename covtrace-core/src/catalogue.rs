//! Baseline and AI-suggested scenario catalogues.
//!
//! A catalogue is a YAML mapping of endpoint keys to categories to scenario
//! lists. Besides the YAML itself, the raw text is scanned for top-level keys
//! so that entries which are present but empty, `null`, or commented out are
//! told apart from entries that are absent: orphan detection depends on it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use utoipa::ToSchema;

use crate::domain::{Priority, Scenario, ScenarioCategory, SourceKind};
use crate::error::{CovTraceError, Result, SourceLocation};
use crate::fs::FileSystem;
use crate::registry::EndpointRegistry;

/// How an endpoint appears in a catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// At least one scenario.
    Populated,
    /// Present with `{}`, `[]` or only empty categories.
    Empty,
    /// Present with no value.
    Null,
    /// Only present as a commented-out top-level key.
    Commented,
    /// Not mentioned at all.
    Absent,
}

/// Scenarios listed for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    /// Whether the entry carries scenarios.
    pub state: EntryState,
    /// Line of the top-level key, when loaded from text.
    pub line: Option<usize>,
    /// Scenarios in catalogue order.
    pub scenarios: Vec<Scenario>,
}

/// One scenario set (baseline or AI-suggested) keyed by endpoint.
#[derive(Debug, Clone)]
pub struct ScenarioCatalogue {
    kind: SourceKind,
    origin: Option<PathBuf>,
    entries: BTreeMap<String, CatalogueEntry>,
    commented: BTreeMap<String, usize>,
}

impl ScenarioCatalogue {
    /// A catalogue with no entries.
    pub fn empty(kind: SourceKind) -> Self {
        Self {
            kind,
            origin: None,
            entries: BTreeMap::new(),
            commented: BTreeMap::new(),
        }
    }

    /// Build a catalogue from already-normalized scenarios.
    ///
    /// Every scenario is re-tagged with `kind`.
    pub fn from_scenarios(kind: SourceKind, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        let mut catalogue = Self::empty(kind);
        for mut scenario in scenarios {
            scenario.source_kind = kind;
            let entry = catalogue
                .entries
                .entry(scenario.endpoint_key.clone())
                .or_insert_with(|| CatalogueEntry {
                    state: EntryState::Populated,
                    line: None,
                    scenarios: Vec::new(),
                });
            entry.scenarios.push(scenario);
        }
        catalogue
    }

    /// Parse catalogue text. `origin` is only used for error locations.
    pub fn parse(raw: &str, kind: SourceKind, origin: Option<&Path>) -> Result<Self> {
        let location = || match origin {
            Some(path) => SourceLocation::file(path),
            None => SourceLocation::default(),
        };

        let scan = scan_top_level(raw, &location)?;
        let document: Value = serde_yaml_ng::from_str(raw).map_err(|err| {
            let mut at = location();
            if let Some(mark) = err.location() {
                at = at.at_line(mark.line());
            }
            CovTraceError::configuration(at, format!("malformed scenario catalogue: {err}"))
        })?;

        let mut catalogue = Self::empty(kind);
        catalogue.origin = origin.map(Path::to_path_buf);

        let mapping = match document {
            Value::Null => None,
            Value::Mapping(mapping) => Some(mapping),
            _ => {
                return Err(CovTraceError::configuration(
                    location(),
                    "scenario catalogue must be a mapping of endpoint keys",
                ));
            }
        };

        for (key, value) in mapping.iter().flatten() {
            let Some(endpoint_key) = key.as_str().map(str::trim) else {
                return Err(CovTraceError::configuration(
                    location(),
                    "endpoint keys must be strings",
                ));
            };
            let line = scan.keys.get(endpoint_key).copied();
            let at = || match line {
                Some(line) => location().at_line(line),
                None => location(),
            };
            let scenarios = parse_entry(endpoint_key, value, kind, &at)?;
            let state = match value {
                Value::Null => EntryState::Null,
                _ if scenarios.is_empty() => EntryState::Empty,
                _ => EntryState::Populated,
            };
            catalogue.entries.insert(
                endpoint_key.to_string(),
                CatalogueEntry {
                    state,
                    line,
                    scenarios,
                },
            );
        }

        catalogue.commented = scan
            .commented
            .into_iter()
            .filter(|(key, _)| !catalogue.entries.contains_key(key))
            .collect();

        Ok(catalogue)
    }

    /// Which catalogue this is.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// File the catalogue was loaded from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Scenarios for an endpoint; empty for every non-populated state.
    pub fn scenarios_for(&self, endpoint_key: &str) -> &[Scenario] {
        self.entries
            .get(endpoint_key)
            .map(|entry| entry.scenarios.as_slice())
            .unwrap_or(&[])
    }

    /// Scenario count for an endpoint.
    pub fn count(&self, endpoint_key: &str) -> usize {
        self.scenarios_for(endpoint_key).len()
    }

    /// How the endpoint appears in this catalogue.
    pub fn state(&self, endpoint_key: &str) -> EntryState {
        if let Some(entry) = self.entries.get(endpoint_key) {
            return entry.state;
        }
        if self.commented.contains_key(endpoint_key) {
            return EntryState::Commented;
        }
        EntryState::Absent
    }

    /// Live (uncommented) entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CatalogueEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Total number of scenarios across all endpoints.
    pub fn total(&self) -> usize {
        self.entries.values().map(|entry| entry.scenarios.len()).sum()
    }

    /// Live entries whose key is not registered, with their line.
    pub fn unknown_keys<'a>(
        &'a self,
        registry: &EndpointRegistry,
    ) -> Vec<(&'a str, Option<usize>)> {
        self.entries
            .iter()
            .filter(|(key, _)| !registry.contains(key))
            .map(|(key, entry)| (key.as_str(), entry.line))
            .collect()
    }

    /// Fail on the first live entry naming an endpoint the registry lacks.
    pub fn validate_against(&self, registry: &EndpointRegistry) -> Result<()> {
        let Some((key, line)) = self.unknown_keys(registry).into_iter().next() else {
            return Ok(());
        };
        let mut location = match &self.origin {
            Some(path) => SourceLocation::file(path),
            None => SourceLocation::default(),
        };
        if let Some(line) = line {
            location = location.at_line(line);
        }
        Err(CovTraceError::configuration(
            location,
            format!("{} catalogue names unknown endpoint key {key}", self.kind),
        ))
    }
}

/// Read and parse a catalogue file.
pub fn load_catalogue<F: FileSystem>(
    fs: &F,
    path: &Path,
    kind: SourceKind,
) -> Result<ScenarioCatalogue> {
    let raw = fs.read_to_string(path)?;
    let catalogue = ScenarioCatalogue::parse(&raw, kind, Some(path))?;
    log::debug!(
        "loaded {kind} catalogue {}: {} endpoints, {} scenarios",
        path.display(),
        catalogue.entries.len(),
        catalogue.total()
    );
    Ok(catalogue)
}

struct TopLevelScan {
    keys: BTreeMap<String, usize>,
    commented: BTreeMap<String, usize>,
}

fn scan_top_level(raw: &str, location: &dyn Fn() -> SourceLocation) -> Result<TopLevelScan> {
    let mut keys = BTreeMap::new();
    let mut commented = BTreeMap::new();

    for (index, line) in raw.lines().enumerate() {
        let number = index + 1;
        if line.starts_with('#') {
            if let Some(key) = commented_key(line) {
                commented.entry(key).or_insert(number);
            }
            continue;
        }
        if line.starts_with(char::is_whitespace) || line.starts_with('-') {
            continue;
        }
        let Some(key) = mapping_key(line) else {
            continue;
        };
        if let Some(first) = keys.insert(key.clone(), number) {
            return Err(CovTraceError::configuration(
                location().at_line(number),
                format!("duplicate endpoint entry {key} (first defined on line {first})"),
            ));
        }
    }

    Ok(TopLevelScan { keys, commented })
}

fn mapping_key(line: &str) -> Option<String> {
    let (key, _) = line.split_once(':')?;
    let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

fn commented_key(line: &str) -> Option<String> {
    let body = line.trim_start_matches('#');
    let body = body.strip_prefix(' ').unwrap_or(body);
    if body.starts_with(char::is_whitespace) {
        return None;
    }
    let key = mapping_key(body)?;
    let identifier = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !identifier || ScenarioCategory::parse(&key).is_some() {
        return None;
    }
    Some(key)
}

fn parse_entry(
    endpoint_key: &str,
    value: &Value,
    kind: SourceKind,
    at: &dyn Fn() -> SourceLocation,
) -> Result<Vec<Scenario>> {
    let categories = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(items) if items.is_empty() => return Ok(Vec::new()),
        Value::Mapping(categories) => categories,
        _ => {
            return Err(CovTraceError::configuration(
                at(),
                format!("{endpoint_key} must map categories to scenario lists"),
            ));
        }
    };

    let mut scenarios = Vec::new();
    for (name, items) in categories {
        let name = name.as_str().unwrap_or_default();
        let Some(category) = ScenarioCategory::parse(name) else {
            return Err(CovTraceError::configuration(
                at(),
                format!("{endpoint_key} has unknown scenario category \"{name}\""),
            ));
        };
        let items = match items {
            Value::Null => continue,
            Value::Sequence(items) => items,
            _ => {
                return Err(CovTraceError::configuration(
                    at(),
                    format!("{endpoint_key}.{category} must be a list of scenarios"),
                ));
            }
        };
        for item in items {
            let (text, priority) = parse_item(item).ok_or_else(|| {
                CovTraceError::configuration(
                    at(),
                    format!("{endpoint_key}.{category} has an invalid scenario entry"),
                )
            })?;
            scenarios.push(Scenario {
                endpoint_key: endpoint_key.to_string(),
                category,
                text,
                source_kind: kind,
                priority: priority.unwrap_or_else(|| category.default_priority()),
            });
        }
    }
    Ok(scenarios)
}

/// Plain text, or `{ text, priority? }`. Blank text and bad priorities are rejected.
fn parse_item(item: &Value) -> Option<(String, Option<Priority>)> {
    let (text, priority) = match item {
        Value::String(text) => (text.as_str(), None),
        Value::Mapping(fields) => {
            let text = fields.get("text").and_then(Value::as_str)?;
            let priority = match fields.get("priority") {
                None | Some(Value::Null) => None,
                Some(value) => Some(Priority::parse(value.as_str()?)?),
            };
            (text, priority)
        }
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some((text.to_string(), priority))
}
