//! Structural extraction of routes, components, API calls and imports.

/// Declare a function returning a lazily compiled, process-wide regex
macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static regex::Regex {
            static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            RE.get_or_init(|| regex::Regex::new($pattern).expect("valid regex"))
        }
    };
}

pub mod angular;
pub mod facts;
pub mod generic;
pub mod react;
pub mod rules;
pub mod svelte;
pub mod ui;
pub mod vue;

pub use facts::{
    ApiCall, Behavior, Component, ComponentId, ExtractionWarning, FileFacts, HttpMethod,
    ImportRef, Route, UiElement, UiElementKind,
};
pub use rules::{ExtractionRule, RuleSet};

use crate::scan::{Framework, SourceFile};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Everything extracted from one scan, merged and deduplicated
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub routes: Vec<Route>,
    pub components: Vec<Component>,
    pub api_calls: Vec<ApiCall>,
    /// Import statements keyed by importing file
    pub imports: BTreeMap<String, Vec<ImportRef>>,
    pub warnings: Vec<ExtractionWarning>,
    pub files_processed: usize,
}

impl ExtractionReport {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.components.is_empty() && self.api_calls.is_empty()
    }
}

/// Runs a framework's rule set over source files
pub struct Extractor {
    rules: RuleSet,
}

impl Extractor {
    pub fn new(framework: Framework) -> Self {
        let rules = RuleSet::for_framework(framework);
        debug!(framework = %framework, rules = ?rules.names(), "selected extraction rules");
        Self { rules }
    }

    pub fn framework(&self) -> Framework {
        self.rules.framework()
    }

    /// Apply every rule to one file and attribute its API calls
    pub fn extract_file(&self, file: &SourceFile) -> FileFacts {
        let mut facts = FileFacts::new();
        for rule in self.rules.iter() {
            if let Some(found) = rule.extract(file) {
                trace!(
                    file = %file.display_path(),
                    rule = rule.name(),
                    routes = found.routes.len(),
                    components = found.components.len(),
                    api_calls = found.api_calls.len(),
                    "rule matched"
                );
                facts.merge(found);
            }
        }
        facts.attribute_api_calls();
        facts
    }

    /// Extract facts from all files in parallel.
    ///
    /// Per-file results are ordered by path before merging so the report does
    /// not depend on the order files were scanned in. Routes keep the first
    /// declaration of a path; components sharing an identity are merged.
    pub fn extract_all(&self, files: &[SourceFile]) -> ExtractionReport {
        let mut per_file: Vec<(String, FileFacts)> = files
            .par_iter()
            .filter(|f| !f.is_manifest())
            .map(|f| (f.display_path(), self.extract_file(f)))
            .collect();
        per_file.sort_by(|a, b| a.0.cmp(&b.0));
        per_file.dedup_by(|a, b| a.0 == b.0);

        let mut report = ExtractionReport {
            files_processed: per_file.len(),
            ..ExtractionReport::default()
        };
        let mut seen_routes: HashSet<String> = HashSet::new();
        let mut component_index: BTreeMap<ComponentId, usize> = BTreeMap::new();
        let mut seen_calls: HashSet<ApiCall> = HashSet::new();

        for (path, facts) in per_file {
            if !facts.has_facts() {
                debug!(file = %path, "no extraction rule matched");
                report.warnings.push(ExtractionWarning {
                    path: path.clone(),
                    reason: "no route, component or API call pattern matched".to_string(),
                });
            }

            for route in facts.routes {
                if seen_routes.insert(route.path.clone()) {
                    report.routes.push(route);
                }
            }
            for component in facts.components {
                match component_index.get(&component.id()) {
                    Some(&i) => report.components[i].absorb(component),
                    None => {
                        component_index.insert(component.id(), report.components.len());
                        report.components.push(component);
                    }
                }
            }
            for call in facts.api_calls {
                if seen_calls.insert(call.clone()) {
                    report.api_calls.push(call);
                }
            }
            if !facts.imports.is_empty() {
                report.imports.insert(path, facts.imports);
            }
        }

        debug!(
            files = report.files_processed,
            routes = report.routes.len(),
            components = report.components.len(),
            api_calls = report.api_calls.len(),
            warnings = report.warnings.len(),
            "extraction finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_app() -> Vec<SourceFile> {
        vec![
            SourceFile::new("package.json", r#"{"dependencies": {"react": "18"}}"#),
            SourceFile::new(
                "src/App.tsx",
                r#"
import { BrowserRouter, Routes, Route } from 'react-router-dom';
import LoginForm from './components/LoginForm';

export default function App() {
  return (
    <BrowserRouter>
      <Routes>
        <Route path="/login" element={<LoginForm />} />
      </Routes>
    </BrowserRouter>
  );
}
"#,
            ),
            SourceFile::new(
                "src/components/LoginForm.tsx",
                r#"
import { useState } from 'react';

export default function LoginForm() {
  const [email, setEmail] = useState('');
  const submit = () => fetch('/api/login', { method: 'POST' });
  return (
    <form onSubmit={submit}>
      <input type="email" placeholder="Email" />
      <button type="submit">Sign In</button>
    </form>
  );
}
"#,
            ),
            SourceFile::new("src/constants.ts", "export const TIMEOUT = 30;"),
        ]
    }

    #[test]
    fn test_login_route_and_form() {
        let report = Extractor::new(Framework::React).extract_all(&login_app());

        assert_eq!(report.routes.len(), 1);
        assert_eq!(report.routes[0].path, "/login");

        let login = report
            .components
            .iter()
            .find(|c| c.name == "LoginForm")
            .expect("LoginForm extracted");
        assert_eq!(
            login.buttons().next().and_then(|b| b.label.as_deref()),
            Some("Sign In")
        );

        assert_eq!(report.api_calls.len(), 1);
        assert_eq!(report.api_calls[0].method, HttpMethod::Post);
        assert_eq!(report.api_calls[0].component.name, "LoginForm");
    }

    #[test]
    fn test_unmatched_file_is_a_warning() {
        let report = Extractor::new(Framework::React).extract_all(&login_app());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, "src/constants.ts");
        assert_eq!(report.files_processed, 3);
    }

    #[test]
    fn test_imports_recorded_per_file() {
        let report = Extractor::new(Framework::React).extract_all(&login_app());
        let app_imports = &report.imports["src/App.tsx"];
        assert!(app_imports.iter().any(|i| i.specifier == "./components/LoginForm"));
    }

    #[test]
    fn test_determinism_across_scan_order() {
        let files = login_app();
        let mut reversed = files.clone();
        reversed.reverse();

        let extractor = Extractor::new(Framework::React);
        let a = serde_json::to_string(&extractor.extract_all(&files)).unwrap();
        let b = serde_json::to_string(&extractor.extract_all(&reversed)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_routes_first_wins() {
        let files = vec![
            SourceFile::new("src/a.tsx", r#"<Route path="/home" element={<RequireAuth><A /></RequireAuth>} />"#),
            SourceFile::new("src/b.tsx", r#"<Route path="/home" element={<B />} />"#),
        ];
        let report = Extractor::new(Framework::React).extract_all(&files);
        assert_eq!(report.routes.len(), 1);
        assert_eq!(report.routes[0].file, "src/a.tsx");
        assert!(report.routes[0].guarded);
    }

    #[test]
    fn test_angular_template_merges_into_class() {
        let files = vec![
            SourceFile::new(
                "src/app/login.component.ts",
                "@Component({ selector: 'app-login', templateUrl: './login.component.html' })\nexport class LoginComponent {}",
            ),
            SourceFile::new(
                "src/app/login.component.html",
                "<button>Sign In</button>",
            ),
        ];
        let report = Extractor::new(Framework::Angular).extract_all(&files);
        assert_eq!(report.components.len(), 1);
        assert_eq!(report.components[0].ui_elements.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let report = Extractor::new(Framework::Unknown).extract_all(&[]);
        assert!(report.is_empty());
        assert_eq!(report.files_processed, 0);
    }
}
