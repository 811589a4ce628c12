// Framework classification from package manifests

use super::scanner::SourceFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

/// Frontend framework a project is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    React,
    Vue,
    Angular,
    Svelte,
    #[default]
    Unknown,
}

/// Detection rules in priority order; the first rule with a matching
/// dependency wins. Meta-frameworks (Angular, SvelteKit, Nuxt) come before
/// React because their projects often pull React tooling in transitively.
const RULES: &[(Framework, &[&str])] = &[
    (Framework::Angular, &["@angular/core", "@angular/cli"]),
    (Framework::Svelte, &["svelte", "@sveltejs/kit", "svelte-preprocess"]),
    (Framework::Vue, &["vue", "nuxt", "@vue/cli-service"]),
    (Framework::React, &["react", "react-dom", "next", "@types/react"]),
];

const DEPENDENCY_KEYS: &[&str] = &["dependencies", "devDependencies", "peerDependencies"];

impl Framework {
    /// Classify a project from the manifests among its scanned files
    pub fn detect(files: &[SourceFile]) -> Framework {
        let mut declared = BTreeSet::new();

        for manifest in files.iter().filter(|f| f.is_manifest()) {
            match serde_json::from_str::<serde_json::Value>(&manifest.content) {
                Ok(json) => {
                    for key in DEPENDENCY_KEYS {
                        if let Some(deps) = json.get(key).and_then(|d| d.as_object()) {
                            declared.extend(deps.keys().cloned());
                        }
                    }
                }
                Err(e) => {
                    warn!(manifest = %manifest.display_path(), error = %e, "ignoring malformed manifest");
                }
            }
        }

        debug!(dependencies = declared.len(), "collected declared dependencies");
        Self::from_dependencies(&declared)
    }

    /// Apply the priority rules to a set of dependency names
    pub fn from_dependencies(declared: &BTreeSet<String>) -> Framework {
        RULES
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| declared.contains(*m)))
            .map(|(framework, _)| *framework)
            .unwrap_or(Framework::Unknown)
    }

    /// Lowercase name as used in prompts and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::Vue => "vue",
            Framework::Angular => "angular",
            Framework::Svelte => "svelte",
            Framework::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
