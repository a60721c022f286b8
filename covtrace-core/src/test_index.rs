//! Attribution of discovered unit tests to endpoints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::AnalysisConfig;
use crate::domain::{Endpoint, HttpMethod, UnitTest};
use crate::registry::EndpointRegistry;

/// A test attributed to more than one endpoint.
///
/// Such a test counts as a candidate for every endpoint listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedAttribution {
    /// Test identifier.
    pub test_id: String,
    /// Endpoints the test was attributed to, in key order.
    pub endpoint_keys: Vec<String>,
}

/// Unit tests indexed by the endpoints they can be attributed to.
#[derive(Debug, Clone, Default)]
pub struct TestIndex {
    tests: Vec<UnitTest>,
    by_endpoint: BTreeMap<String, Vec<usize>>,
    by_test: Vec<Vec<String>>,
}

impl TestIndex {
    /// Attribute every test against every registered endpoint.
    pub fn build(
        registry: &EndpointRegistry,
        tests: Vec<UnitTest>,
        config: &AnalysisConfig,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let mut tests: Vec<UnitTest> = tests
            .into_iter()
            .filter(|test| {
                let fresh = seen.insert(test.id.clone());
                if !fresh {
                    log::warn!("ignoring duplicate test id {}", test.id);
                }
                fresh
            })
            .collect();
        tests.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.line_number.cmp(&b.line_number))
                .then(a.id.cmp(&b.id))
        });

        let mut by_endpoint: BTreeMap<String, Vec<usize>> = registry
            .iter()
            .map(|endpoint| (endpoint.key.clone(), Vec::new()))
            .collect();
        let mut by_test = Vec::with_capacity(tests.len());

        for (position, test) in tests.iter().enumerate() {
            let mut keys = Vec::new();
            for endpoint in registry.iter() {
                if !test.endpoint_key_candidates.is_empty()
                    && !test.endpoint_key_candidates.contains(&endpoint.key)
                {
                    continue;
                }
                if attributes_to(endpoint, test, &config.partial_update_markers) {
                    keys.push(endpoint.key.clone());
                    if let Some(slot) = by_endpoint.get_mut(&endpoint.key) {
                        slot.push(position);
                    }
                }
            }
            by_test.push(keys);
        }

        Self {
            tests,
            by_endpoint,
            by_test,
        }
    }

    /// Tests attributed to an endpoint, ordered by file path, line and id.
    pub fn tests_for(&self, endpoint_key: &str) -> Vec<&UnitTest> {
        self.by_endpoint
            .get(endpoint_key)
            .map(|positions| positions.iter().map(|&i| &self.tests[i]).collect())
            .unwrap_or_default()
    }

    /// Number of tests attributed to an endpoint.
    pub fn count_for(&self, endpoint_key: &str) -> usize {
        self.by_endpoint
            .get(endpoint_key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// All indexed tests with the endpoints each was attributed to.
    pub fn attributed(&self) -> impl Iterator<Item = (&UnitTest, &[String])> {
        self.tests
            .iter()
            .zip(self.by_test.iter().map(Vec::as_slice))
    }

    /// Endpoints a test was attributed to, in key order.
    pub fn attributions(&self, test_id: &str) -> &[String] {
        self.tests
            .iter()
            .position(|test| test.id == test_id)
            .map(|position| self.by_test[position].as_slice())
            .unwrap_or(&[])
    }

    /// Tests not attributed to any endpoint.
    pub fn unattributed(&self) -> impl Iterator<Item = &UnitTest> {
        self.attributed()
            .filter(|(_, keys)| keys.is_empty())
            .map(|(test, _)| test)
    }

    /// Tests attributed to more than one endpoint.
    pub fn shared_attributions(&self) -> Vec<SharedAttribution> {
        let mut shared: Vec<SharedAttribution> = self
            .attributed()
            .filter(|(_, keys)| keys.len() > 1)
            .map(|(test, keys)| SharedAttribution {
                test_id: test.id.clone(),
                endpoint_keys: keys.to_vec(),
            })
            .collect();
        shared.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        shared
    }

    /// Number of indexed tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the index holds no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Whether `test` can be attributed to `endpoint`.
///
/// The method must match and the test text must mention one of the endpoint's
/// path segments, singular or plural. PATCH endpoints also accept tests whose
/// method is unknown or PUT when their name or path carries the word `patch`
/// or one of `partial_update_markers`, since "update" names are shared
/// between PUT and PATCH tests.
pub fn attributes_to(
    endpoint: &Endpoint,
    test: &UnitTest,
    partial_update_markers: &[String],
) -> bool {
    let text = descriptive_text(test);
    let vocabulary = descriptive_words(test);
    let method = effective_method(test, &vocabulary);

    let method_matches = method == Some(endpoint.method)
        || (endpoint.method == HttpMethod::Patch
            && matches!(method, None | Some(HttpMethod::Put))
            && has_partial_update_marker(&vocabulary, partial_update_markers));
    if !method_matches {
        return false;
    }

    endpoint
        .path_segments
        .iter()
        .flat_map(|segment| segment_forms(segment))
        .any(|form| text.contains(&form))
}

/// Declared method, else one inferred from the test name or file name.
///
/// `vocabulary` holds the words of the name and path; a whole-word `patch`
/// there makes the test a PATCH test.
pub fn effective_method(test: &UnitTest, vocabulary: &BTreeSet<String>) -> Option<HttpMethod> {
    if test.method.is_some() {
        return test.method;
    }
    if mentions_patch(vocabulary) {
        return Some(HttpMethod::Patch);
    }
    infer_method(&test.declared_name).or_else(|| {
        test.file_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(infer_method)
    })
}

/// Infer an HTTP method from verbs in an identifier or description.
///
/// Returns `None` when no verb is found or verbs of several methods appear.
pub fn infer_method(name: &str) -> Option<HttpMethod> {
    let methods: BTreeSet<HttpMethod> = words(name)
        .iter()
        .filter_map(|word| verb_method(word))
        .collect();
    if methods.len() == 1 {
        methods.into_iter().next()
    } else {
        None
    }
}

fn verb_method(word: &str) -> Option<HttpMethod> {
    match word {
        "get" | "gets" | "fetch" | "fetches" | "find" | "finds" | "list" | "lists"
        | "retrieve" | "retrieves" | "read" | "reads" | "search" => Some(HttpMethod::Get),
        "create" | "creates" | "post" | "posts" | "add" | "adds" | "register" | "registers"
        | "save" | "saves" => Some(HttpMethod::Post),
        "update" | "updates" | "put" | "puts" | "replace" | "replaces" => Some(HttpMethod::Put),
        "patch" | "patches" => Some(HttpMethod::Patch),
        "delete" | "deletes" | "remove" | "removes" => Some(HttpMethod::Delete),
        _ => None,
    }
}

fn mentions_patch(vocabulary: &BTreeSet<String>) -> bool {
    vocabulary.contains("patch") || vocabulary.contains("patches")
}

fn has_partial_update_marker(vocabulary: &BTreeSet<String>, markers: &[String]) -> bool {
    mentions_patch(vocabulary)
        || markers.iter().any(|marker| {
            let marker = words(marker);
            !marker.is_empty() && marker.iter().all(|word| vocabulary.contains(word))
        })
}

fn descriptive_text(test: &UnitTest) -> String {
    format!("{} {}", test.declared_name, test.file_path.display()).to_lowercase()
}

fn descriptive_words(test: &UnitTest) -> BTreeSet<String> {
    words(&test.declared_name)
        .into_iter()
        .chain(words(&test.file_path.display().to_string()))
        .collect()
}

/// Split an identifier or sentence into lower-case words, breaking on
/// camelCase humps, digits boundaries and non-alphanumerics.
pub(crate) fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous: Option<char> = None;

    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            flush(&mut words, &mut current);
            previous = None;
            continue;
        }
        let boundary = match previous {
            Some(prev) => {
                (prev.is_lowercase() && ch.is_uppercase())
                    || (prev.is_alphabetic() && ch.is_ascii_digit())
                    || (prev.is_ascii_digit() && ch.is_alphabetic())
            }
            None => false,
        };
        if boundary {
            flush(&mut words, &mut current);
        }
        current.extend(ch.to_lowercase());
        previous = Some(ch);
    }
    flush(&mut words, &mut current);
    words
}

fn flush(words: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// The segment plus its singular or plural counterpart.
fn segment_forms(segment: &str) -> Vec<String> {
    let segment = segment.to_lowercase();
    let mut forms = vec![segment.clone()];
    let other = if let Some(stem) = segment.strip_suffix("ies") {
        format!("{stem}y")
    } else if ["sses", "xes", "ches", "shes"]
        .iter()
        .any(|suffix| segment.ends_with(suffix))
    {
        segment[..segment.len() - 2].to_string()
    } else if segment.ends_with('s') && !segment.ends_with("ss") && !segment.ends_with("us") {
        segment[..segment.len() - 1].to_string()
    } else if let Some(stem) = segment
        .strip_suffix('y')
        .filter(|stem| !stem.ends_with(['a', 'e', 'i', 'o', 'u']))
    {
        format!("{stem}ies")
    } else if ["s", "x", "ch", "sh"]
        .iter()
        .any(|suffix| segment.ends_with(suffix))
    {
        format!("{segment}es")
    } else {
        format!("{segment}s")
    };
    if !other.is_empty() && other != segment {
        forms.push(other);
    }
    forms
}

#[cfg(test)]
mod tests {
    use super::{
        TestIndex, attributes_to, descriptive_words, effective_method, infer_method,
        segment_forms, words,
    };
    use crate::config::AnalysisConfig;
    use crate::domain::{HttpMethod, UnitTest};
    use crate::registry::EndpointRegistry;
    use std::path::PathBuf;

    fn test_case(id: &str, path: &str, name: &str, method: Option<HttpMethod>) -> UnitTest {
        UnitTest {
            id: id.to_string(),
            file_path: PathBuf::from(path),
            line_number: 10,
            declared_name: name.to_string(),
            endpoint_key_candidates: Vec::new(),
            method,
        }
    }

    fn registry() -> EndpointRegistry {
        let mut registry = EndpointRegistry::new();
        registry
            .register("GET_CustomerById", HttpMethod::Get, "/customers/{id}")
            .expect("get");
        registry
            .register("POST_CreateCustomer", HttpMethod::Post, "/customers")
            .expect("post");
        registry
            .register("PUT_Customer", HttpMethod::Put, "/customers/{id}")
            .expect("put");
        registry
            .register("PATCH_CustomerEmail", HttpMethod::Patch, "/customers/{id}/email")
            .expect("patch");
        registry
            .register("GET_Orders", HttpMethod::Get, "/orders")
            .expect("orders");
        registry
    }

    #[test]
    fn get_test_never_lands_in_post_candidates() {
        let tests = vec![test_case(
            "get-1",
            "src/test/CustomerControllerTest.java",
            "getCustomerById_returns200",
            None,
        )];
        let index = TestIndex::build(&registry(), tests, &AnalysisConfig::default());

        assert_eq!(index.count_for("GET_CustomerById"), 1);
        assert_eq!(index.count_for("POST_CreateCustomer"), 0);
        assert_eq!(index.count_for("GET_Orders"), 0);
    }

    #[test]
    fn same_method_without_segment_overlap_is_rejected() {
        let tests = vec![test_case(
            "orders",
            "src/test/OrderTest.java",
            "listOrders",
            Some(HttpMethod::Get),
        )];
        let index = TestIndex::build(&registry(), tests, &AnalysisConfig::default());
        assert_eq!(index.count_for("GET_Orders"), 1);
        assert_eq!(index.count_for("GET_CustomerById"), 0);
    }

    #[test]
    fn email_patch_test_is_a_patch_candidate_despite_update_wording() {
        let tests = vec![test_case(
            "patch-email",
            "src/test/java/EmailPatchTest.java",
            "shouldUpdateCustomerEmail",
            None,
        )];
        let index = TestIndex::build(&registry(), tests, &AnalysisConfig::default());

        let candidates = index.tests_for("PATCH_CustomerEmail");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "patch-email");
        assert_eq!(index.count_for("PUT_Customer"), 0);
    }

    #[test]
    fn dispatch_is_not_read_as_patch() {
        let mut registry = registry();
        registry
            .register("POST_CreateDispatch", HttpMethod::Post, "/dispatches")
            .expect("dispatch");
        registry
            .register("PATCH_Dispatch", HttpMethod::Patch, "/dispatches/{id}")
            .expect("patch dispatch");
        let test = test_case(
            "dispatch",
            "src/test/DispatchControllerTest.java",
            "createDispatch",
            None,
        );
        assert_eq!(
            effective_method(&test, &descriptive_words(&test)),
            Some(HttpMethod::Post)
        );

        let index = TestIndex::build(&registry, vec![test], &AnalysisConfig::default());
        assert_eq!(index.count_for("POST_CreateDispatch"), 1);
        assert_eq!(index.count_for("PATCH_Dispatch"), 0);
    }

    #[test]
    fn patch_word_in_path_still_marks_patch() {
        let test = test_case(
            "patch-dir",
            "src/test/patches/CustomerEmailTest.java",
            "updatesCustomerEmail",
            None,
        );
        assert_eq!(
            effective_method(&test, &descriptive_words(&test)),
            Some(HttpMethod::Patch)
        );
    }

    #[test]
    fn partial_update_marker_admits_put_named_test_to_patch() {
        let endpoint_registry = registry();
        let endpoint = endpoint_registry.resolve("PATCH_CustomerEmail").expect("patch");
        let test = test_case(
            "email",
            "src/test/CustomerEmailTest.java",
            "updateCustomerEmail",
            None,
        );
        let markers = AnalysisConfig::default().partial_update_markers;
        assert!(attributes_to(endpoint, &test, &markers));

        let declared_get = test_case(
            "email-get",
            "src/test/CustomerEmailTest.java",
            "getCustomerEmail",
            Some(HttpMethod::Get),
        );
        assert!(!attributes_to(endpoint, &declared_get, &markers));
    }

    #[test]
    fn candidates_narrow_the_endpoints_considered() {
        let mut test = test_case(
            "narrow",
            "src/test/CustomerTest.java",
            "getCustomer",
            None,
        );
        test.endpoint_key_candidates = vec!["GET_Orders".to_string()];
        let index = TestIndex::build(&registry(), vec![test], &AnalysisConfig::default());

        assert_eq!(index.count_for("GET_CustomerById"), 0);
        assert_eq!(index.count_for("GET_Orders"), 0);
        assert_eq!(index.unattributed().count(), 1);
    }

    #[test]
    fn shared_attribution_lists_every_endpoint() {
        let mut registry = registry();
        registry
            .register("GET_Customers", HttpMethod::Get, "/customers")
            .expect("list");
        let tests = vec![test_case(
            "shared",
            "src/test/CustomerTest.java",
            "fetchCustomer",
            None,
        )];
        let index = TestIndex::build(&registry, tests, &AnalysisConfig::default());

        let shared = index.shared_attributions();
        assert_eq!(shared.len(), 1);
        assert_eq!(index.attributions("shared"), shared[0].endpoint_keys.as_slice());
        assert!(index.attributions("missing").is_empty());
        assert_eq!(
            shared[0].endpoint_keys,
            vec!["GET_CustomerById".to_string(), "GET_Customers".to_string()]
        );
    }

    #[test]
    fn tests_for_orders_by_file_then_line_and_drops_duplicate_ids() {
        let mut later = test_case("b", "src/test/b/CustomerTest.java", "getCustomer", None);
        later.line_number = 1;
        let earlier = test_case("a", "src/test/a/CustomerTest.java", "getCustomer", None);
        let duplicate = test_case("a", "src/test/z/CustomerTest.java", "getCustomer", None);
        let index = TestIndex::build(
            &registry(),
            vec![later, earlier, duplicate],
            &AnalysisConfig::default(),
        );

        let ids: Vec<_> = index
            .tests_for("GET_CustomerById")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn infers_methods_from_names() {
        assert_eq!(infer_method("shouldCreateCustomer"), Some(HttpMethod::Post));
        assert_eq!(infer_method("test_delete_order"), Some(HttpMethod::Delete));
        assert_eq!(infer_method("createThenGetCustomer"), None);
        assert_eq!(infer_method("returns404WhenMissing"), None);
    }

    #[test]
    fn splits_words_on_humps_and_separators() {
        assert_eq!(
            words("getCustomerById_returns404"),
            vec!["get", "customer", "by", "id", "returns", "404"]
        );
        assert_eq!(words("it('lists all orders')"), vec!["it", "lists", "all", "orders"]);
    }

    #[test]
    fn segment_forms_cover_singular_and_plural() {
        assert_eq!(segment_forms("customers"), vec!["customers", "customer"]);
        assert_eq!(segment_forms("categories"), vec!["categories", "category"]);
        assert_eq!(segment_forms("category"), vec!["category", "categories"]);
        assert_eq!(segment_forms("addresses"), vec!["addresses", "address"]);
        assert_eq!(segment_forms("email"), vec!["email", "emails"]);
        assert_eq!(segment_forms("status"), vec!["status", "statuses"]);
    }
}
