// Bounded, hashable context handed to every generation stage

use super::graph::DependencyGraph;
use crate::extract::{ApiCall, Component, ComponentId, ExtractionReport, Route};
use crate::scan::Framework;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Default serialized size limit for a context
pub const DEFAULT_BUDGET: usize = 48 * 1024;

/// Smallest budget accepted
pub const MIN_BUDGET: usize = 1024;

/// The facts of one repository, bounded to a size budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub framework: Framework,
    pub routes: Vec<Route>,
    pub components: Vec<Component>,
    pub api_calls: Vec<ApiCall>,
    pub graph: DependencyGraph,
    /// Whether facts were dropped to fit the budget
    pub truncated: bool,
    /// SHA-256 of the facts before truncation
    pub content_hash: String,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.components.is_empty() && self.api_calls.is_empty()
    }

    /// Serialized size in bytes, the quantity the budget bounds
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.name == id.name && c.file == id.file)
    }

    /// The `limit` components most depended upon
    pub fn key_components(&self, limit: usize) -> Vec<&Component> {
        self.graph
            .rank()
            .into_iter()
            .filter_map(|(id, _)| self.component(&id))
            .take(limit)
            .collect()
    }

    /// API calls made by a component
    pub fn calls_from(&self, id: &ComponentId) -> Vec<&ApiCall> {
        self.api_calls.iter().filter(|c| &c.component == id).collect()
    }

    /// One-line description for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} framework, {} routes, {} components, {} API calls, {} dependencies{}",
            self.framework,
            self.routes.len(),
            self.components.len(),
            self.api_calls.len(),
            self.graph.edge_count(),
            if self.truncated { " (truncated)" } else { "" }
        )
    }
}

/// The hashed portion of a context, in canonical field order
#[derive(Serialize)]
struct HashedFacts<'a> {
    framework: Framework,
    routes: &'a [Route],
    components: &'a [Component],
    api_calls: &'a [ApiCall],
    graph: &'a DependencyGraph,
}

/// SHA-256 (hex) of the canonical JSON of a set of facts
pub fn content_hash(
    framework: Framework,
    routes: &[Route],
    components: &[Component],
    api_calls: &[ApiCall],
    graph: &DependencyGraph,
) -> String {
    let facts = HashedFacts {
        framework,
        routes,
        components,
        api_calls,
        graph,
    };
    let bytes = serde_json::to_vec(&facts).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Assembles extraction output into a [`Context`] within a byte budget
pub struct ContextAssembler {
    budget: usize,
}

impl ContextAssembler {
    pub fn new(budget: usize) -> Self {
        if budget < MIN_BUDGET {
            warn!(budget, minimum = MIN_BUDGET, "context budget raised to minimum");
        }
        Self {
            budget: budget.max(MIN_BUDGET),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Build the context. Never fails; over-budget facts are dropped from the
    /// tail of API calls, then components, then routes.
    pub fn assemble(
        &self,
        framework: Framework,
        facts: ExtractionReport,
        graph: DependencyGraph,
    ) -> Context {
        let hash = content_hash(
            framework,
            &facts.routes,
            &facts.components,
            &facts.api_calls,
            &graph,
        );
        let mut context = Context {
            framework,
            routes: facts.routes,
            components: facts.components,
            api_calls: facts.api_calls,
            graph,
            truncated: false,
            content_hash: hash,
        };
        self.fit(&mut context);
        debug!(
            bytes = context.serialized_len(),
            budget = self.budget,
            truncated = context.truncated,
            hash = %context.content_hash,
            "assembled context"
        );
        context
    }

    fn fit(&self, context: &mut Context) {
        let mut size = context.serialized_len();
        if size <= self.budget {
            return;
        }
        context.truncated = true;
        let before = (
            context.routes.len(),
            context.components.len(),
            context.api_calls.len(),
        );

        loop {
            size = context.serialized_len();
            if size <= self.budget {
                break;
            }
            let mut excess = size - self.budget;

            if !context.api_calls.is_empty() {
                drop_tail(&mut context.api_calls, &mut excess);
            } else if !context.components.is_empty() {
                drop_tail(&mut context.components, &mut excess);
                let keep: HashSet<ComponentId> =
                    context.components.iter().map(|c| c.id()).collect();
                context.graph = context.graph.retain(&keep);
            } else if !context.routes.is_empty() {
                drop_tail(&mut context.routes, &mut excess);
            } else if context.graph.node_count() > 0 {
                context.graph = DependencyGraph::new();
            } else {
                warn!(size, budget = self.budget, "empty context still exceeds budget");
                break;
            }
        }

        warn!(
            dropped_routes = before.0 - context.routes.len(),
            dropped_components = before.1 - context.components.len(),
            dropped_api_calls = before.2 - context.api_calls.len(),
            budget = self.budget,
            "context truncated to fit budget"
        );
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

/// Pop items off the end until their estimated size covers `excess`.
/// Always removes at least one item.
fn drop_tail<T: Serialize>(items: &mut Vec<T>, excess: &mut usize) {
    while let Some(item) = items.pop() {
        let len = serde_json::to_vec(&item).map(|v| v.len()).unwrap_or(0) + 1;
        if len >= *excess {
            *excess = 0;
            break;
        }
        *excess -= len;
    }
}
