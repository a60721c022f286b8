//! Explicit cache of oracle answers.
//!
//! The cache is owned by the caller and handed to each run. Nothing is
//! invalidated implicitly: callers drop entries for endpoints whose sources
//! changed, or clear the whole cache.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::oracle::{OracleRequest, OracleResponse};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    endpoint_key: String,
    scenario: String,
    candidates: Vec<String>,
}

impl CacheKey {
    fn of(request: &OracleRequest) -> Self {
        Self {
            endpoint_key: request.endpoint_key.clone(),
            scenario: request.scenario.text.clone(),
            candidates: request.candidates.iter().map(|t| t.id.clone()).collect(),
        }
    }
}

/// Oracle answers keyed by endpoint, scenario text and candidate test ids.
#[derive(Debug, Default)]
pub struct OracleCache {
    entries: Mutex<BTreeMap<CacheKey, OracleResponse>>,
}

impl OracleCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer for an identical request.
    pub fn get(&self, request: &OracleRequest) -> Option<OracleResponse> {
        self.lock().get(&CacheKey::of(request)).cloned()
    }

    /// Store an answer.
    pub fn insert(&self, request: &OracleRequest, response: OracleResponse) {
        self.lock().insert(CacheKey::of(request), response);
    }

    /// Drop every answer for one endpoint, returning how many were removed.
    pub fn invalidate(&self, endpoint_key: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.endpoint_key != endpoint_key);
        before - entries.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached answers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CacheKey, OracleResponse>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::OracleCache;
    use crate::domain::{Priority, Scenario, ScenarioCategory, SourceKind, UnitTest};
    use crate::oracle::{OracleRequest, OracleResponse};
    use std::path::PathBuf;

    fn request(endpoint: &str, candidates: &[&str]) -> OracleRequest {
        OracleRequest {
            endpoint_key: endpoint.to_string(),
            scenario: Scenario {
                endpoint_key: endpoint.to_string(),
                category: ScenarioCategory::HappyCase,
                text: "returns 200".to_string(),
                source_kind: SourceKind::Baseline,
                priority: Priority::P1,
            },
            candidates: candidates
                .iter()
                .map(|id| UnitTest {
                    id: id.to_string(),
                    file_path: PathBuf::from("t.py"),
                    line_number: 1,
                    declared_name: id.to_string(),
                    endpoint_key_candidates: Vec::new(),
                    method: None,
                })
                .collect(),
        }
    }

    #[test]
    fn hit_requires_identical_candidates() {
        let cache = OracleCache::new();
        cache.insert(&request("GET_A", &["t1"]), OracleResponse::default());

        assert!(cache.get(&request("GET_A", &["t1"])).is_some());
        assert!(cache.get(&request("GET_A", &["t1", "t2"])).is_none());
        assert!(cache.get(&request("GET_B", &["t1"])).is_none());
    }

    #[test]
    fn invalidate_only_drops_one_endpoint() {
        let cache = OracleCache::new();
        cache.insert(&request("GET_A", &["t1"]), OracleResponse::default());
        cache.insert(&request("GET_A", &["t2"]), OracleResponse::default());
        cache.insert(&request("GET_B", &["t1"]), OracleResponse::default());

        assert_eq!(cache.invalidate("GET_A"), 2);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
