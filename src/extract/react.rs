// React: JSX routes and function/class components

use super::facts::{Component, FileFacts, Route};
use super::rules::{normalize_route, window, ExtractionRule};
use super::ui;
use crate::scan::SourceFile;

/// Wrappers that mark a route as requiring authentication
pub(crate) const GUARD_COMPONENTS: &[&str] = &[
    "ProtectedRoute",
    "PrivateRoute",
    "RequireAuth",
    "AuthGuard",
    "AuthRoute",
    "GuardedRoute",
    "Authenticated",
];

static_regex!(
    route_tag_re,
    r"<(Route|ProtectedRoute|PrivateRoute|AuthRoute|GuardedRoute)\b"
);
static_regex!(
    path_attr_re,
    r#"\bpath\s*=\s*(?:"([^"]*)"|'([^']*)'|\{\s*["'`]([^"'`]*)["'`]\s*\})"#
);

/// `<Route path="…">` declarations (react-router v5/v6)
pub struct JsxRouteRule;

impl JsxRouteRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsxRouteRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for JsxRouteRule {
    fn name(&self) -> &'static str {
        "jsx-routes"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let content = &file.content;
        let tags: Vec<(usize, bool)> = route_tag_re()
            .captures_iter(content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let wrapper = caps.get(1)?.as_str() != "Route";
                Some((whole.start(), wrapper))
            })
            .collect();
        if tags.is_empty() {
            return None;
        }

        let mut facts = FileFacts::new();
        for (i, &(start, wrapper)) in tags.iter().enumerate() {
            let limit = tags.get(i + 1).map_or(400, |&(next, _)| (next - start).min(400));
            let tag = window(content, start, limit);
            let Some(caps) = path_attr_re().captures(tag) else {
                continue;
            };
            let raw = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            let Some(path) = normalize_route(raw) else {
                continue;
            };
            let guarded = wrapper || GUARD_COMPONENTS.iter().any(|g| tag.contains(g));
            facts
                .routes
                .push(Route::new(path, file.display_path()).guarded(guarded));
        }

        if facts.routes.is_empty() {
            None
        } else {
            Some(facts)
        }
    }
}

static_regex!(
    function_decl_re,
    r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+([A-Z]\w*)\s*[(<]"
);
static_regex!(
    arrow_decl_re,
    r"(?m)^[ \t]*(?:export\s+)?(?:const|let|var)\s+([A-Z]\w*)\s*(?::[^=\n]+)?=\s*(?:React\.)?(?:memo|forwardRef|observer)?\s*\(?\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=\n]+)?=>|\w+\s*=>)"
);
static_regex!(
    class_decl_re,
    r"(?m)^[ \t]*(?:export\s+)?(?:default\s+)?class\s+([A-Z]\w*)\s+extends\s+(?:React\.)?(?:Pure)?Component\b"
);
static_regex!(
    markup_re,
    r"</[A-Za-z][\w.]*\s*>|<[A-Za-z][\w.]*\b[^<>]*/>"
);

/// Whether a fragment contains JSX/HTML markup
pub(crate) fn has_markup(source: &str) -> bool {
    markup_re().is_match(source)
}

/// Capitalized declarations in source order: `(offset, name)`
pub(crate) fn component_declarations(content: &str) -> Vec<(usize, String)> {
    let mut decls: Vec<(usize, String)> = Vec::new();
    for re in [function_decl_re(), arrow_decl_re(), class_decl_re()] {
        for caps in re.captures_iter(content) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                decls.push((whole.start(), name.as_str().to_string()));
            }
        }
    }
    decls.sort();
    decls.dedup_by(|a, b| a.1 == b.1);
    decls
}

/// Components declared in a JSX file: each declaration owns the text up to the
/// next one and must render markup inside it
pub(crate) fn jsx_components(file: &SourceFile) -> Option<FileFacts> {
    let content = &file.content;
    if !has_markup(content) {
        return None;
    }
    let decls = component_declarations(content);
    let mut facts = FileFacts::new();
    for (i, (start, name)) in decls.iter().enumerate() {
        let end = decls.get(i + 1).map_or(content.len(), |(next, _)| *next);
        let body = &content[*start..end];
        if !has_markup(body) {
            continue;
        }
        let mut component = Component::new(name.clone(), file.display_path());
        component.ui_elements = ui::ui_elements(body);
        component.behavior = ui::behavior(body);
        facts.push_component(*start, component);
    }

    if facts.components.is_empty() {
        None
    } else {
        Some(facts)
    }
}

/// Function, arrow and class components that return markup
pub struct FunctionComponentRule;

impl FunctionComponentRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FunctionComponentRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for FunctionComponentRule {
    fn name(&self) -> &'static str {
        "react-components"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        if !matches!(file.extension.as_str(), "jsx" | "tsx" | "js" | "ts") {
            return None;
        }
        jsx_components(file)
    }
}
