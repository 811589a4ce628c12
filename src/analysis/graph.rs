// Component dependency graph built from resolved imports

use crate::extract::{Component, ComponentId, ImportRef};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Extensions tried, in order, when an import omits one
const EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "vue", "svelte"];

/// Directed graph of components; an edge `A -> B` means A imports or uses B.
/// Cycles are allowed and every traversal is bounded by a visited set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphSnapshot", from = "GraphSnapshot")]
pub struct DependencyGraph {
    graph: DiGraph<ComponentId, ()>,
    index: HashMap<ComponentId, NodeIndex>,
}

/// Serialized form: sorted nodes plus edges as index pairs into `nodes`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    nodes: Vec<ComponentId>,
    edges: Vec<[usize; 2]>,
}

impl From<DependencyGraph> for GraphSnapshot {
    fn from(graph: DependencyGraph) -> Self {
        let nodes = graph.nodes();
        let position: HashMap<&ComponentId, usize> =
            nodes.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut edges: Vec<[usize; 2]> = graph
            .edges()
            .iter()
            .filter_map(|(from, to)| Some([*position.get(from)?, *position.get(to)?]))
            .collect();
        edges.sort();
        GraphSnapshot { nodes, edges }
    }
}

impl From<GraphSnapshot> for DependencyGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = DependencyGraph::new();
        for id in &snapshot.nodes {
            graph.add_node(id.clone());
        }
        for [from, to] in snapshot.edges {
            if let (Some(a), Some(b)) = (snapshot.nodes.get(from), snapshot.nodes.get(to)) {
                graph.add_edge(a, b);
            }
        }
        graph
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component node; returns the existing node for a known identity
    pub fn add_node(&mut self, id: ComponentId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id, idx);
        idx
    }

    /// Add `from -> to`. Self-edges, duplicates and unknown nodes are ignored.
    pub fn add_edge(&mut self, from: &ComponentId, to: &ComponentId) -> bool {
        if from == to {
            return false;
        }
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        if self.graph.find_edge(a, b).is_some() {
            return false;
        }
        self.graph.add_edge(a, b, ());
        true
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All nodes, sorted by identity
    pub fn nodes(&self) -> Vec<ComponentId> {
        let mut nodes: Vec<ComponentId> = self.graph.node_weights().cloned().collect();
        nodes.sort();
        nodes
    }

    /// All edges as `(from, to)`, sorted
    pub fn edges(&self) -> Vec<(ComponentId, ComponentId)> {
        let mut edges: Vec<(ComponentId, ComponentId)> = self
            .graph
            .edge_references()
            .map(|e| (self.graph[e.source()].clone(), self.graph[e.target()].clone()))
            .collect();
        edges.sort();
        edges
    }

    fn neighbors(&self, id: &ComponentId, direction: Direction) -> Vec<ComponentId> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<ComponentId> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Outgoing => self.graph[e.target()].clone(),
                Direction::Incoming => self.graph[e.source()].clone(),
            })
            .collect();
        out.sort();
        out
    }

    /// Components `id` imports directly
    pub fn dependencies_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Components that import `id` directly
    pub fn dependents_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Breadth-first walk of everything reachable from `from` within
    /// `max_depth` hops. Each node appears at most once; `from` is excluded.
    pub fn reachable(&self, from: &ComponentId, max_depth: usize) -> Vec<ComponentId> {
        let Some(&start) = self.index.get(from) else {
            return Vec::new();
        };
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);
        let mut result = Vec::new();

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut next: Vec<NodeIndex> = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|e| e.target())
                .collect();
            next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            for target in next {
                if visited.insert(target) {
                    result.push(self.graph[target].clone());
                    queue.push_back((target, depth + 1));
                }
            }
        }
        result
    }

    /// Components ordered by how many others depend on them (descending),
    /// ties broken by identity
    pub fn rank(&self) -> Vec<(ComponentId, usize)> {
        let mut ranked: Vec<(ComponentId, usize)> = self
            .graph
            .node_indices()
            .map(|idx| {
                let in_degree = self.graph.edges_directed(idx, Direction::Incoming).count();
                (self.graph[idx].clone(), in_degree)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Subgraph containing only the `keep` nodes and the edges between them
    pub fn retain(&self, keep: &HashSet<ComponentId>) -> DependencyGraph {
        let mut sub = DependencyGraph::new();
        for id in self.nodes() {
            if keep.contains(&id) {
                sub.add_node(id);
            }
        }
        for (from, to) in self.edges() {
            sub.add_edge(&from, &to);
        }
        sub
    }
}

impl PartialEq for DependencyGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes() == other.nodes() && self.edges() == other.edges()
    }
}

/// Builds a [`DependencyGraph`] by resolving each file's import specifiers
/// against the files that declare components
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn build(
        components: &[Component],
        imports: &BTreeMap<String, Vec<ImportRef>>,
    ) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let mut by_file: BTreeMap<&str, Vec<&Component>> = BTreeMap::new();

        let mut sorted: Vec<&Component> = components.iter().collect();
        sorted.sort_by(|a, b| a.id().cmp(&b.id()));
        for component in sorted {
            graph.add_node(component.id());
            by_file.entry(component.file.as_str()).or_default().push(component);
        }
        let known: BTreeSet<&str> = by_file.keys().copied().collect();

        let mut unresolved = 0usize;
        for (file, sources) in &by_file {
            let Some(file_imports) = imports.get(*file) else {
                continue;
            };
            for import in file_imports {
                let Some(target_file) = resolve_import(file, &import.specifier, &known) else {
                    unresolved += 1;
                    continue;
                };
                let Some(targets) = by_file.get(target_file.as_str()) else {
                    continue;
                };

                let named: Vec<&&Component> = targets
                    .iter()
                    .filter(|t| import.names.iter().any(|n| *n == t.name))
                    .collect();
                let chosen: Vec<ComponentId> = if named.is_empty() {
                    targets.iter().map(|t| t.id()).collect()
                } else {
                    named.iter().map(|t| t.id()).collect()
                };

                for source in sources {
                    for target in &chosen {
                        graph.add_edge(&source.id(), target);
                    }
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            unresolved,
            "built dependency graph"
        );
        graph
    }
}

/// Resolve an import specifier to one of the `known` files.
///
/// Relative specifiers resolve against the importing file's directory;
/// `@/` and `~/` map to `src/`. Bare package imports never resolve.
pub fn resolve_import(from_file: &str, specifier: &str, known: &BTreeSet<&str>) -> Option<String> {
    let base = if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = from_file.rsplit_once('/').map_or("", |(dir, _)| dir);
        normalize(&format!("{}/{}", dir, specifier))?
    } else if let Some(rest) = specifier
        .strip_prefix("@/")
        .or_else(|| specifier.strip_prefix("~/"))
    {
        normalize(&format!("src/{}", rest))?
    } else {
        return None;
    };

    let mut candidates = vec![base.clone()];
    candidates.extend(EXTENSIONS.iter().map(|ext| format!("{}.{}", base, ext)));
    candidates.extend(EXTENSIONS.iter().map(|ext| format!("{}/index.{}", base, ext)));
    candidates.into_iter().find(|c| known.contains(c.as_str()))
}

/// Collapse `.` and `..` segments; `None` if the path escapes the root
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
