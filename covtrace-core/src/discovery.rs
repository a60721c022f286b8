//! Unit-test discovery across Java, Kotlin, C#, Rust, Python, JavaScript,
//! TypeScript and Go sources.
//!
//! Discovery is lexical: test declarations are found with per-language
//! patterns, and the lines up to the next declaration are treated as the
//! test body. HTTP calls in the body provide the test's method and, when the
//! registry is known, the endpoints whose path templates they hit.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use regex::Regex;
use tokei::{Config, LanguageType};

use crate::domain::{Endpoint, HttpMethod, UnitTest};
use crate::error::{CovTraceError, Result};
use crate::fs::FileSystem;
use crate::registry::EndpointRegistry;

/// Lines above a test searched for `endpoint: KEY` markers.
const MARKER_WINDOW: usize = 3;
/// Lines an annotation may precede its declaration by.
const ANNOTATION_REACH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Java,
    Kotlin,
    CSharp,
    Rust,
    Python,
    JavaScript,
    Go,
}

impl Dialect {
    fn of(language: LanguageType) -> Option<Self> {
        match language {
            LanguageType::Java => Some(Self::Java),
            LanguageType::Kotlin => Some(Self::Kotlin),
            LanguageType::CSharp => Some(Self::CSharp),
            LanguageType::Rust => Some(Self::Rust),
            LanguageType::Python => Some(Self::Python),
            LanguageType::JavaScript
            | LanguageType::TypeScript
            | LanguageType::Jsx
            | LanguageType::Tsx => Some(Self::JavaScript),
            LanguageType::Go => Some(Self::Go),
            _ => None,
        }
    }
}

struct Syntaxes {
    java_annotation: Regex,
    java_declaration: Regex,
    kotlin_declaration: Regex,
    csharp_attribute: Regex,
    csharp_declaration: Regex,
    rust_attribute: Regex,
    rust_declaration: Regex,
    python_declaration: Regex,
    js_declaration: Regex,
    go_declaration: Regex,
    marker: Regex,
    request: Regex,
    csharp_request: Regex,
    go_request: Regex,
}

impl Syntaxes {
    fn compile() -> Result<Self> {
        Ok(Self {
            java_annotation: compile(
                r"^\s*@(?:Test|ParameterizedTest|RepeatedTest|TestFactory)\b",
            )?,
            java_declaration: compile(
                r"^\s*(?:(?:public|protected|private|static|final)\s+)*void\s+([A-Za-z_$][\w$]*)\s*\(",
            )?,
            kotlin_declaration: compile(
                r"^\s*(?:(?:public|internal|private|override|suspend)\s+)*fun\s+(?:`([^`]+)`|([A-Za-z_]\w*))\s*\(",
            )?,
            csharp_attribute: compile(r"^\s*\[\s*(?:Fact|Theory|Test|TestMethod|TestCase)\b")?,
            csharp_declaration: compile(
                r"^\s*(?:(?:public|private|protected|internal|static|async)\s+)*(?:void|Task(?:<[^>]*>)?)\s+([A-Za-z_]\w*)\s*\(",
            )?,
            rust_attribute: compile(r"^\s*#\[(?:\w+::)*test\b")?,
            rust_declaration: compile(
                r"^\s*(?:#\[[^\]]*\]\s*)*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([A-Za-z_]\w*)",
            )?,
            python_declaration: compile(r"^\s*(?:async\s+)?def\s+(test\w*)\s*\(")?,
            js_declaration: compile(
                r#"\b(?:it|test)(?:\.only|\.skip)?\s*\(\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#,
            )?,
            go_declaration: compile(r"^func\s+(Test\w*)\s*\(\s*\w+\s+\*testing\.T\s*\)")?,
            marker: compile(r"(?i)(?://|#|\*|--)\s*endpoint:\s*([A-Za-z0-9_.\-]+)")?,
            request: compile(r#"(?i)\b(get|post|put|patch|delete)\s*\(\s*["'`](/[^"'`\s]*)"#)?,
            csharp_request: compile(
                r#"\b(Get|Post|Put|Patch|Delete)(?:AsJson)?Async\s*\(\s*\$?"(/[^"\s]*)"#,
            )?,
            go_request: compile(
                r#"NewRequest(?:WithContext)?\(\s*(?:\w+\s*,\s*)?(?:http\.Method(Get|Post|Put|Patch|Delete)|"(GET|POST|PUT|PATCH|DELETE)")\s*,\s*"(/[^"\s]*)""#,
            )?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| CovTraceError::Other(format!("invalid discovery pattern: {err}")))
}

/// A test declaration found in a file.
struct Declaration {
    name: String,
    /// Zero-based line of the declaration.
    line: usize,
    /// Zero-based first line belonging to the test (its first annotation).
    start: usize,
}

/// Finds unit tests in a source tree.
pub struct TestDiscovery<F: FileSystem> {
    fs: F,
    config: Config,
    routes: Vec<Endpoint>,
    syntaxes: Syntaxes,
}

impl<F: FileSystem> TestDiscovery<F> {
    /// Create a discovery pass with default `tokei` configuration.
    pub fn new(fs: F) -> Result<Self> {
        Ok(Self {
            fs,
            config: Config::default(),
            routes: Vec::new(),
            syntaxes: Syntaxes::compile()?,
        })
    }

    /// Resolve request paths in test bodies against these endpoints.
    pub fn with_registry(mut self, registry: &EndpointRegistry) -> Self {
        self.routes = registry.iter().cloned().collect();
        self
    }

    /// Discover every test under `root`.
    ///
    /// Files that cannot be read are logged and skipped. Ids use paths
    /// relative to `root`.
    pub fn discover(&self, root: &Path) -> Result<Vec<UnitTest>> {
        let mut tests = Vec::new();
        for path in self.fs.list_files(root)? {
            let Some(dialect) =
                LanguageType::from_path(&path, &self.config).and_then(Dialect::of)
            else {
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if !is_test_source(dialect, relative) {
                continue;
            }
            let contents = match self.fs.read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    log::warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            tests.extend(self.parse_in(dialect, relative, &contents));
        }
        log::debug!("discovered {} tests under {}", tests.len(), root.display());
        Ok(tests)
    }

    /// Parse one file's contents; the language is taken from `path`.
    pub fn parse_file(&self, path: &Path, contents: &str) -> Vec<UnitTest> {
        match LanguageType::from_path(path, &self.config).and_then(Dialect::of) {
            Some(dialect) => self.parse_in(dialect, path, contents),
            None => Vec::new(),
        }
    }

    fn parse_in(&self, dialect: Dialect, path: &Path, contents: &str) -> Vec<UnitTest> {
        let lines: Vec<&str> = contents.lines().collect();
        let declarations = self.declarations(dialect, &lines);
        let mut seen = HashSet::new();
        let mut tests = Vec::with_capacity(declarations.len());

        for (position, declaration) in declarations.iter().enumerate() {
            let end = declarations
                .get(position + 1)
                .map(|next| next.start)
                .unwrap_or(lines.len())
                .max(declaration.line + 1);
            let body = &lines[declaration.line..end];
            let requests = self.requests(dialect, body);

            let methods: BTreeSet<HttpMethod> =
                requests.iter().map(|(method, _)| *method).collect();
            let method = if methods.len() == 1 {
                methods.into_iter().next()
            } else {
                None
            };

            let window = declaration.start.saturating_sub(MARKER_WINDOW)..=declaration.line;
            let mut candidates: BTreeSet<String> = lines[window]
                .iter()
                .filter_map(|line| self.syntaxes.marker.captures(line))
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect();
            for (request_method, request_path) in &requests {
                candidates.extend(
                    self.routes
                        .iter()
                        .filter(|route| {
                            route.method == *request_method
                                && route_matches(&route.path_template, request_path)
                        })
                        .map(|route| route.key.clone()),
                );
            }

            let mut id = format!("{}::{}", path.display(), declaration.name);
            if !seen.insert(id.clone()) {
                id = format!("{id}#{}", declaration.line + 1);
            }
            tests.push(UnitTest {
                id,
                file_path: path.to_path_buf(),
                line_number: declaration.line + 1,
                declared_name: declaration.name.clone(),
                endpoint_key_candidates: candidates.into_iter().collect(),
                method,
            });
        }
        tests
    }

    fn declarations(&self, dialect: Dialect, lines: &[&str]) -> Vec<Declaration> {
        let syntaxes = &self.syntaxes;
        match dialect {
            Dialect::Java => {
                annotated(lines, &syntaxes.java_annotation, &syntaxes.java_declaration)
            }
            Dialect::Kotlin => {
                annotated(lines, &syntaxes.java_annotation, &syntaxes.kotlin_declaration)
            }
            Dialect::CSharp => {
                annotated(lines, &syntaxes.csharp_attribute, &syntaxes.csharp_declaration)
            }
            Dialect::Rust => annotated(lines, &syntaxes.rust_attribute, &syntaxes.rust_declaration),
            Dialect::Python => direct(lines, &syntaxes.python_declaration),
            Dialect::JavaScript => direct(lines, &syntaxes.js_declaration),
            Dialect::Go => direct(lines, &syntaxes.go_declaration),
        }
    }

    fn requests(&self, dialect: Dialect, body: &[&str]) -> Vec<(HttpMethod, String)> {
        let syntaxes = &self.syntaxes;
        let mut requests = Vec::new();
        for line in body {
            let found = match dialect {
                Dialect::CSharp => captures_request(&syntaxes.csharp_request, line, &[1], 2),
                Dialect::Go => captures_request(&syntaxes.go_request, line, &[1, 2], 3),
                _ => captures_request(&syntaxes.request, line, &[1], 2),
            };
            requests.extend(found);
        }
        requests
    }
}

fn captures_request(
    pattern: &Regex,
    line: &str,
    method_groups: &[usize],
    path_group: usize,
) -> Vec<(HttpMethod, String)> {
    pattern
        .captures_iter(line)
        .filter_map(|caps| {
            let method = method_groups
                .iter()
                .find_map(|&group| caps.get(group))
                .and_then(|m| HttpMethod::parse(m.as_str()))?;
            let path = caps.get(path_group)?.as_str().to_string();
            Some((method, path))
        })
        .collect()
}

/// Declarations preceded by a test annotation within a few lines.
fn annotated(lines: &[&str], annotation: &Regex, declaration: &Regex) -> Vec<Declaration> {
    let mut found = Vec::new();
    let mut pending: Option<usize> = None;
    for (index, line) in lines.iter().enumerate() {
        if annotation.is_match(line) {
            pending.get_or_insert(index);
        }
        let Some(start) = pending else {
            continue;
        };
        if index - start > ANNOTATION_REACH {
            pending = None;
            continue;
        }
        if let Some(name) = first_group(declaration, line) {
            found.push(Declaration {
                name,
                line: index,
                start,
            });
            pending = None;
        }
    }
    found
}

/// Declarations recognisable on their own line.
fn direct(lines: &[&str], declaration: &Regex) -> Vec<Declaration> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            first_group(declaration, line).map(|name| Declaration {
                name,
                line: index,
                start: index,
            })
        })
        .collect()
}

fn first_group(pattern: &Regex, line: &str) -> Option<String> {
    let caps = pattern.captures(line)?;
    caps.iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().trim().to_string())
        .find(|name| !name.is_empty())
}

fn is_test_source(dialect: Dialect, path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match dialect {
        Dialect::Go => name.ends_with("_test.go"),
        Dialect::JavaScript => {
            name.contains(".test.")
                || name.contains(".spec.")
                || path
                    .components()
                    .any(|part| part.as_os_str() == "__tests__" || part.as_os_str() == "test")
        }
        _ => true,
    }
}

/// Whether a literal request path hits a path template.
///
/// A request path ending in `/` is taken to be completed at runtime, so it
/// may match a template with one extra trailing parameter.
fn route_matches(template: &str, request: &str) -> bool {
    let request = request.split(['?', '#']).next().unwrap_or_default();
    let wanted: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let mut got: Vec<&str> = request.split('/').filter(|s| !s.is_empty()).collect();
    let open_tail = request.len() > 1 && request.ends_with('/');
    if open_tail
        && got.len() + 1 == wanted.len()
        && wanted.last().is_some_and(|segment| is_parameter(segment))
    {
        got.push("{}");
    }
    wanted.len() == got.len()
        && wanted
            .iter()
            .zip(&got)
            .all(|(want, have)| is_parameter(want) || want.eq_ignore_ascii_case(have))
}

fn is_parameter(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}
