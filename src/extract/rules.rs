// Extraction rule trait, per-framework rule sets and the shared rules

use super::facts::{ApiCall, ComponentId, FileFacts, HttpMethod, ImportRef};
use super::{angular, generic, react, svelte, vue};
use crate::scan::{Framework, SourceFile};

/// A pattern rule that pulls facts out of one file.
///
/// Returns `None` when the rule does not apply to the file or finds nothing.
pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, file: &SourceFile) -> Option<FileFacts>;
}

/// The rules used for one framework, chosen once per run
pub struct RuleSet {
    framework: Framework,
    rules: Vec<Box<dyn ExtractionRule>>,
}

impl RuleSet {
    pub fn for_framework(framework: Framework) -> Self {
        let mut rules: Vec<Box<dyn ExtractionRule>> = match framework {
            Framework::React => vec![
                Box::new(react::JsxRouteRule::new()),
                Box::new(generic::ObjectRouteRule::react_router()),
                Box::new(react::FunctionComponentRule::new()),
            ],
            Framework::Vue => vec![
                Box::new(generic::ObjectRouteRule::vue_router()),
                Box::new(vue::SfcComponentRule::new()),
            ],
            Framework::Angular => vec![
                Box::new(generic::ObjectRouteRule::angular()),
                Box::new(angular::ComponentClassRule::new()),
                Box::new(angular::TemplateFileRule::new()),
            ],
            Framework::Svelte => vec![
                Box::new(svelte::FileRouteRule::new()),
                Box::new(svelte::ComponentRule::new()),
            ],
            Framework::Unknown => vec![
                Box::new(react::JsxRouteRule::new()),
                Box::new(generic::ObjectRouteRule::any()),
                Box::new(generic::ComponentRule::new()),
            ],
        };
        rules.push(Box::new(ApiRule::new()));
        rules.push(Box::new(ImportRule::new()));
        Self { framework, rules }
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    /// Rule names in evaluation order
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ExtractionRule> {
        self.rules.iter().map(|r| r.as_ref())
    }
}

static_regex!(
    fetch_re,
    r#"(?:\$fetch|\buseFetch|\bfetch)\s*\(\s*["'`]([^"'`]+)["'`]"#
);
static_regex!(
    client_re,
    r#"\b(?:axios|api|http|this\.http|this\.httpClient|httpClient|client|\$http|ky)\s*\.\s*(get|post|put|patch|delete)\s*(?:<[^>(]*>)?\s*\(\s*["'`]([^"'`]+)["'`]"#
);
static_regex!(axios_config_re, r"\baxios\s*\(\s*\{([^}]*)\}");
static_regex!(config_url_re, r#"\burl\s*:\s*["'`]([^"'`]+)["'`]"#);
static_regex!(config_method_re, r#"\bmethod\s*:\s*["'`](\w+)["'`]"#);

/// HTTP client calls: `fetch`, `axios`, Angular `HttpClient`, Nuxt `$fetch`
pub struct ApiRule;

impl ApiRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApiRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for ApiRule {
    fn name(&self) -> &'static str {
        "api-calls"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let content = &file.content;
        let owner = file_ref(file);
        let mut facts = FileFacts::new();
        let mut push = |offset: usize, method: HttpMethod, path: &str| {
            if !path.contains('/') {
                return;
            }
            facts.push_api_call(
                offset,
                ApiCall {
                    method,
                    path: path.trim().to_string(),
                    component: owner.clone(),
                },
            );
        };

        for caps in fetch_re().captures_iter(content) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let options = window(content, whole.end(), 200);
            let options = options.split(';').next().unwrap_or("");
            let method = config_method_re()
                .captures(options)
                .and_then(|c| c.get(1))
                .and_then(|m| HttpMethod::parse(m.as_str()))
                .unwrap_or(HttpMethod::Get);
            push(whole.start(), method, path.as_str());
        }

        for caps in client_re().captures_iter(content) {
            let (Some(whole), Some(verb), Some(path)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            if let Some(method) = HttpMethod::parse(verb.as_str()) {
                push(whole.start(), method, path.as_str());
            }
        }

        for caps in axios_config_re().captures_iter(content) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(url) = config_url_re().captures(body.as_str()).and_then(|c| c.get(1)) else {
                continue;
            };
            let method = config_method_re()
                .captures(body.as_str())
                .and_then(|c| c.get(1))
                .and_then(|m| HttpMethod::parse(m.as_str()))
                .unwrap_or(HttpMethod::Get);
            push(whole.start(), method, url.as_str());
        }

        if facts.api_calls.is_empty() {
            None
        } else {
            Some(facts)
        }
    }
}

static_regex!(
    import_from_re,
    r#"\bimport\s+(?:type\s+)?([\w*{}\s,$]+?)\s+from\s+["']([^"']+)["']"#
);
static_regex!(import_bare_re, r#"\bimport\s+["']([^"']+)["']"#);
static_regex!(
    export_from_re,
    r#"\bexport\s+(?:type\s+)?(\*(?:\s+as\s+\w+)?|\{[^}]*\})\s+from\s+["']([^"']+)["']"#
);
static_regex!(require_re, r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#);
static_regex!(dynamic_import_re, r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#);

/// Module specifiers a file imports, for the dependency graph
pub struct ImportRule;

impl ImportRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImportRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for ImportRule {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let content = &file.content;
        let mut found: Vec<(usize, ImportRef)> = Vec::new();

        for caps in import_from_re().captures_iter(content) {
            let (Some(whole), Some(clause), Some(spec)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            found.push((whole.start(), ImportRef::new(spec.as_str(), bound_names(clause.as_str()))));
        }
        for caps in export_from_re().captures_iter(content) {
            let (Some(whole), Some(clause), Some(spec)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            found.push((whole.start(), ImportRef::new(spec.as_str(), bound_names(clause.as_str()))));
        }
        for re in [import_bare_re(), require_re(), dynamic_import_re()] {
            for caps in re.captures_iter(content) {
                if let (Some(whole), Some(spec)) = (caps.get(0), caps.get(1)) {
                    found.push((whole.start(), ImportRef::new(spec.as_str(), Vec::new())));
                }
            }
        }

        if found.is_empty() {
            return None;
        }
        found.sort_by_key(|(offset, _)| *offset);
        let mut facts = FileFacts::new();
        for (_, import) in found {
            facts.add_import(import);
        }
        Some(facts)
    }
}

/// Names bound by an import clause: `Default, { A, B as C }` → `[Default, A, B]`.
/// Namespace imports bind nothing usable.
fn bound_names(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let (outside, inside) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{} {}", &clause[..open], &clause[close + 1..]),
            &clause[open + 1..close],
        ),
        _ => (clause.to_string(), ""),
    };

    for part in outside.split(',') {
        let part = part.trim();
        if part.is_empty() || part.starts_with('*') || part == "type" {
            continue;
        }
        names.push(part.to_string());
    }
    for part in inside.split(',') {
        let name = part
            .split_whitespace()
            .find(|w| *w != "type")
            .unwrap_or("");
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Pseudo-component reference for facts in files that declare no component
pub(crate) fn file_ref(file: &SourceFile) -> ComponentId {
    ComponentId::new(file.stem(), file.display_path())
}

/// Up to `max` bytes of `content` from `start`, cut on a char boundary
pub(crate) fn window(content: &str, start: usize, max: usize) -> &str {
    let start = start.min(content.len());
    let mut end = (start + max).min(content.len());
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[start..end]
}

/// Root a route path: `''` → `/`, `users/:id` → `/users/:id`. Wildcards stay.
pub(crate) fn normalize_route(raw: &str) -> Option<String> {
    let path = raw.trim();
    if path.chars().any(char::is_whitespace) {
        return None;
    }
    if path.is_empty() {
        return Some("/".to_string());
    }
    if path.starts_with('/') || path == "*" || path == "**" {
        Some(path.to_string())
    } else {
        Some(format!("/{}", path))
    }
}
