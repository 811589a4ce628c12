// Component graph diagrams
//
// Graphviz DOT for code_graph.dot and Mermaid for embedding in Markdown.

use crate::analysis::Context;
use crate::config::OutputConfig;
use crate::extract::{Component, ComponentId};
use std::collections::HashSet;

/// Role of a component in the rendered graph, used for node styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Declared in a file that also declares a route
    Route,
    Form,
    Api,
    Component,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Route => "Route",
            NodeRole::Form => "Form",
            NodeRole::Api => "API",
            NodeRole::Component => "Component",
        }
    }

    fn fill_color(&self) -> &'static str {
        match self {
            NodeRole::Route => "lightgreen",
            NodeRole::Form => "lightyellow",
            NodeRole::Api => "lightcoral",
            NodeRole::Component => "lightblue",
        }
    }

    fn mermaid_class(&self) -> &'static str {
        match self {
            NodeRole::Route => ":::route",
            NodeRole::Form => ":::form",
            NodeRole::Api => ":::api",
            NodeRole::Component => "",
        }
    }
}

/// Classify a component by what the context knows about it
pub fn node_role(context: &Context, id: &ComponentId) -> NodeRole {
    if context.routes.iter().any(|r| r.file == id.file) {
        return NodeRole::Route;
    }
    let component: Option<&Component> = context.component(id);
    if component.map_or(false, |c| c.behavior.form_submit) {
        NodeRole::Form
    } else if !context.calls_from(id).is_empty() {
        NodeRole::Api
    } else {
        NodeRole::Component
    }
}

/// Renders the component dependency graph of a context
pub struct DiagramGenerator {
    /// Maximum nodes to display; the most depended-upon are kept
    max_nodes: usize,
}

impl DiagramGenerator {
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }

    /// Graphviz export of every node and edge
    pub fn dot(&self, context: &Context) -> String {
        let mut lines = vec![
            "digraph CodeDependency {".to_string(),
            "  rankdir=TB;".to_string(),
            "  node [shape=box, style=filled];".to_string(),
            String::new(),
        ];

        for id in context.graph.nodes() {
            let role = node_role(context, &id);
            lines.push(format!(
                "  \"{}\" [fillcolor={}, label=\"{}\\n({})\"];",
                dot_escape(&id.to_string()),
                role.fill_color(),
                dot_escape(&id.name),
                role.as_str()
            ));
        }

        lines.push(String::new());
        for (from, to) in context.graph.edges() {
            lines.push(format!(
                "  \"{}\" -> \"{}\";",
                dot_escape(&from.to_string()),
                dot_escape(&to.to_string())
            ));
        }
        lines.push("}".to_string());

        let mut dot = lines.join("\n");
        dot.push('\n');
        dot
    }

    /// Mermaid flowchart, limited to `max_nodes` nodes
    pub fn mermaid(&self, context: &Context) -> String {
        let mut lines = vec!["graph TB".to_string()];

        let shown: Vec<ComponentId> = if context.graph.node_count() > self.max_nodes {
            context
                .graph
                .rank()
                .into_iter()
                .take(self.max_nodes)
                .map(|(id, _)| id)
                .collect()
        } else {
            context.graph.nodes()
        };
        let visible: HashSet<&ComponentId> = shown.iter().collect();

        for id in &shown {
            let role = node_role(context, id);
            lines.push(format!(
                "    {}[\"{}\"]{}",
                sanitize_id(&id.to_string()),
                id.name.replace('"', "'"),
                role.mermaid_class()
            ));
        }

        for (from, to) in context.graph.edges() {
            if visible.contains(&from) && visible.contains(&to) {
                lines.push(format!(
                    "    {} --> {}",
                    sanitize_id(&from.to_string()),
                    sanitize_id(&to.to_string())
                ));
            }
        }

        lines.join("\n")
    }
}

impl Default for DiagramGenerator {
    fn default() -> Self {
        Self::new(OutputConfig::default().diagram_max_nodes)
    }
}

/// Sanitize a string for use as a Mermaid node ID
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContextAssembler, DependencyGraph};
    use crate::extract::{ApiCall, ExtractionReport, HttpMethod, Route};
    use crate::scan::Framework;

    fn context() -> Context {
        let mut report = ExtractionReport::default();
        report.routes.push(Route::new("/", "src/App.tsx"));
        let app = Component::new("App", "src/App.tsx");
        let mut form = Component::new("LoginForm", "src/LoginForm.tsx");
        form.behavior.form_submit = true;
        let list = Component::new("UserList", "src/UserList.tsx");
        let nav = Component::new("Nav", "src/Nav.tsx");
        report.api_calls.push(ApiCall {
            method: HttpMethod::Get,
            path: "/api/users".into(),
            component: list.id(),
        });

        let mut graph = DependencyGraph::new();
        for c in [&app, &form, &list, &nav] {
            graph.add_node(c.id());
        }
        graph.add_edge(&app.id(), &form.id());
        graph.add_edge(&app.id(), &list.id());
        graph.add_edge(&list.id(), &app.id());
        report.components = vec![app, form, list, nav];
        ContextAssembler::default().assemble(Framework::React, report, graph)
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("App (src/App.tsx)"), "App__src_App_tsx_");
        assert_eq!(sanitize_id("MyClass"), "MyClass");
    }

    #[test]
    fn test_node_roles() {
        let ctx = context();
        assert_eq!(node_role(&ctx, &ComponentId::new("App", "src/App.tsx")), NodeRole::Route);
        assert_eq!(node_role(&ctx, &ComponentId::new("LoginForm", "src/LoginForm.tsx")), NodeRole::Form);
        assert_eq!(node_role(&ctx, &ComponentId::new("UserList", "src/UserList.tsx")), NodeRole::Api);
        assert_eq!(node_role(&ctx, &ComponentId::new("Nav", "src/Nav.tsx")), NodeRole::Component);
    }

    #[test]
    fn test_dot_export() {
        let dot = DiagramGenerator::default().dot(&context());
        assert!(dot.starts_with("digraph CodeDependency {"));
        assert!(dot.contains("rankdir=TB;"));
        assert!(dot.contains("\"LoginForm (src/LoginForm.tsx)\" [fillcolor=lightyellow, label=\"LoginForm\\n(Form)\"];"));
        assert!(dot.contains("\"App (src/App.tsx)\" -> \"UserList (src/UserList.tsx)\";"));
        assert!(dot.contains("\"UserList (src/UserList.tsx)\" -> \"App (src/App.tsx)\";"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_mermaid_limits_nodes() {
        let full = DiagramGenerator::default().mermaid(&context());
        assert!(full.starts_with("graph TB"));
        assert!(full.contains(":::form"));
        assert_eq!(full.matches("-->").count(), 3);

        let limited = DiagramGenerator::new(2).mermaid(&context());
        let nodes = limited.lines().filter(|l| l.contains("[\"")).count();
        assert_eq!(nodes, 2);
        assert!(!limited.contains("Nav"));
    }
}
