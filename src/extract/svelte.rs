// Svelte components and SvelteKit file-system routes

use super::facts::{Component, FileFacts, Route};
use super::rules::ExtractionRule;
use super::ui;
use crate::scan::SourceFile;

const ROUTES_DIR: &str = "src/routes/";

/// Directory segments below `src/routes/` for a SvelteKit route file, or
/// `None` when the file is not inside a routes tree
fn route_segments(path: &str) -> Option<Vec<&str>> {
    let start = if path.starts_with(ROUTES_DIR) {
        ROUTES_DIR.len()
    } else {
        path.find(&format!("/{}", ROUTES_DIR))? + ROUTES_DIR.len() + 1
    };
    let rest = &path[start..];
    let dir = rest.rsplit_once('/').map_or("", |(dir, _)| dir);
    Some(dir.split('/').filter(|s| !s.is_empty()).collect())
}

/// `src/routes/(app)/users/[id]/+page.svelte` → `/users/:id`
pub(crate) fn route_from_path(path: &str) -> Option<String> {
    if !path.ends_with("/+page.svelte") && path != "+page.svelte" {
        return None;
    }
    let mut pattern = String::new();
    for segment in route_segments(path)? {
        if segment.starts_with('(') && segment.ends_with(')') {
            continue;
        }
        pattern.push('/');
        if let Some(rest) = segment.strip_prefix("[...").and_then(|s| s.strip_suffix(']')) {
            pattern.push('*');
            pattern.push_str(rest);
        } else if let Some(opt) = segment.strip_prefix("[[").and_then(|s| s.strip_suffix("]]")) {
            pattern.push(':');
            pattern.push_str(opt);
            pattern.push('?');
        } else if let Some(param) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            pattern.push(':');
            pattern.push_str(param);
        } else {
            pattern.push_str(segment);
        }
    }
    if pattern.is_empty() {
        pattern.push('/');
    }
    Some(pattern)
}

/// Component name for a `.svelte` file. SvelteKit `+page`/`+layout` files are
/// named after their directory.
fn component_name(file: &SourceFile) -> String {
    let stem = file.stem();
    let Some(kind) = stem.strip_prefix('+') else {
        return ui::pascal_case(stem);
    };
    let path = file.display_path();
    let dir = route_segments(&path)
        .and_then(|segments| {
            segments
                .into_iter()
                .rev()
                .find(|s| !(s.starts_with('(') && s.ends_with(')')))
                .map(|s| ui::pascal_case(s))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Index".to_string());
    format!("{}{}", dir, ui::pascal_case(kind))
}

pub(crate) fn svelte_component(file: &SourceFile) -> Option<FileFacts> {
    if file.extension != "svelte" {
        return None;
    }
    let name = component_name(file);
    if name.is_empty() {
        return None;
    }
    let mut component = Component::new(name, file.display_path());
    component.ui_elements = ui::ui_elements(&file.content);
    component.behavior = ui::behavior(&file.content);

    let mut facts = FileFacts::new();
    facts.push_component(0, component);
    Some(facts)
}

/// Every `.svelte` file is a component
pub struct ComponentRule;

impl ComponentRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ComponentRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for ComponentRule {
    fn name(&self) -> &'static str {
        "svelte-components"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        svelte_component(file)
    }
}

/// SvelteKit routes come from `+page.svelte` locations under `src/routes`
pub struct FileRouteRule;

impl FileRouteRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileRouteRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for FileRouteRule {
    fn name(&self) -> &'static str {
        "sveltekit-routes"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let path = file.display_path();
        let pattern = route_from_path(&path)?;
        let mut facts = FileFacts::new();
        facts.routes.push(Route::new(pattern, path));
        Some(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_from_path() {
        assert_eq!(route_from_path("src/routes/+page.svelte").as_deref(), Some("/"));
        assert_eq!(route_from_path("src/routes/login/+page.svelte").as_deref(), Some("/login"));
        assert_eq!(
            route_from_path("src/routes/(app)/users/[id]/+page.svelte").as_deref(),
            Some("/users/:id")
        );
        assert_eq!(
            route_from_path("apps/web/src/routes/docs/[...slug]/+page.svelte").as_deref(),
            Some("/docs/*slug")
        );
        assert_eq!(
            route_from_path("src/routes/[[lang]]/about/+page.svelte").as_deref(),
            Some("/:lang?/about")
        );
        assert_eq!(route_from_path("src/routes/login/+layout.svelte"), None);
        assert_eq!(route_from_path("src/lib/+page.svelte"), None);
    }

    #[test]
    fn test_page_component_named_after_directory() {
        let page = SourceFile::new(
            "src/routes/login/+page.svelte",
            "<script>let email = $state('');</script>\n<form on:submit|preventDefault={login}><button>Sign In</button></form>",
        );
        let facts = ComponentRule::new().extract(&page).unwrap();
        let component = &facts.components[0];
        assert_eq!(component.name, "LoginPage");
        assert!(component.behavior.local_state);
        assert!(component.behavior.form_submit);

        let root = SourceFile::new("src/routes/+layout.svelte", "<slot />");
        assert_eq!(ComponentRule::new().extract(&root).unwrap().components[0].name, "IndexLayout");
    }

    #[test]
    fn test_file_route_rule() {
        let file = SourceFile::new("src/routes/settings/+page.svelte", "<h1>Settings</h1>");
        let facts = FileRouteRule::new().extract(&file).unwrap();
        assert_eq!(facts.routes[0].path, "/settings");
        assert_eq!(facts.routes[0].file, "src/routes/settings/+page.svelte");
        assert!(FileRouteRule::new().extract(&SourceFile::new("src/lib/Nav.svelte", "")).is_none());
    }
}
