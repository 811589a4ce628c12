// Router-config objects and the framework-agnostic component rule

use super::facts::{FileFacts, Route};
use super::rules::{normalize_route, window, ExtractionRule};
use super::{react, svelte, vue};
use crate::scan::SourceFile;

static_regex!(object_path_re, r#"\bpath\s*:\s*["'`]([^"'`]*)["'`]"#);

/// Keys that make an object with a `path` a route declaration
const ROUTE_KEYS: &[&str] = &[
    "component",
    "element",
    "loadComponent",
    "loadChildren",
    "children",
    "redirectTo",
    "redirect",
];

/// Route tables written as objects: `{ path: '/x', component: X }`
pub struct ObjectRouteRule {
    name: &'static str,
    /// At least one must appear in the file
    file_markers: &'static [&'static str],
    /// Any of these inside a route object marks it guarded
    guard_markers: &'static [&'static str],
}

impl ObjectRouteRule {
    pub fn react_router() -> Self {
        Self {
            name: "react-router-objects",
            file_markers: &["createBrowserRouter", "createHashRouter", "useRoutes", "RouteObject"],
            guard_markers: react::GUARD_COMPONENTS,
        }
    }

    pub fn vue_router() -> Self {
        Self {
            name: "vue-router",
            file_markers: &["createRouter", "VueRouter", "RouteRecordRaw", "routes"],
            guard_markers: &["requiresAuth: true", "requiresAuth:true", "beforeEnter"],
        }
    }

    pub fn angular() -> Self {
        Self {
            name: "angular-routes",
            file_markers: &["Routes", "RouterModule", "provideRouter"],
            guard_markers: &["canActivate", "canMatch", "canLoad"],
        }
    }

    /// Union of all of the above, for projects of unknown framework
    pub fn any() -> Self {
        Self {
            name: "object-routes",
            file_markers: &[
                "createBrowserRouter",
                "createHashRouter",
                "useRoutes",
                "createRouter",
                "VueRouter",
                "Routes",
                "RouterModule",
                "routes",
            ],
            guard_markers: &[
                "requiresAuth: true",
                "requiresAuth:true",
                "beforeEnter",
                "canActivate",
                "canMatch",
                "ProtectedRoute",
                "RequireAuth",
                "PrivateRoute",
            ],
        }
    }
}

impl ExtractionRule for ObjectRouteRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let content = &file.content;
        if !self.file_markers.iter().any(|m| content.contains(m)) {
            return None;
        }

        let matches: Vec<(usize, String)> = object_path_re()
            .captures_iter(content)
            .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().to_string())))
            .collect();

        let mut facts = FileFacts::new();
        for (i, (start, raw)) in matches.iter().enumerate() {
            let limit = matches.get(i + 1).map_or(600, |(next, _)| (next - start).min(600));
            let object = window(content, *start, limit);
            if !ROUTE_KEYS.iter().any(|k| object.contains(k)) {
                continue;
            }
            let Some(path) = normalize_route(raw) else {
                continue;
            };
            let guarded = self.guard_markers.iter().any(|g| object.contains(g));
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

/// Components of any flavor: JSX functions, single-file `.vue`, `.svelte`
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
        "generic-components"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        match file.extension.as_str() {
            "vue" => vue::sfc_component(file),
            "svelte" => svelte::svelte_component(file),
            "jsx" | "tsx" | "js" | "ts" => react::jsx_components(file),
            _ => None,
        }
    }
}
