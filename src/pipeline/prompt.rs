//! Prompt construction for the model-backed stages.
//!
//! Prompts are bounded to a character limit. When a prompt is too long the
//! upstream artifact text is cut first, down to a reserved share of the space,
//! then the context section.

use super::stage::TestKind;
use crate::analysis::Context;
use crate::extract::UiElementKind;
use std::fmt::Write;

/// Heading emitted when extraction found nothing
pub const NO_FACTS_HEADING: &str = "NO FACTS DETECTED";

const TRUNCATION_MARKER: &str = "\n[... truncated]\n";
const KEY_COMPONENT_LIMIT: usize = 10;
/// Upstream text keeps at least `available / UPSTREAM_SHARE` characters
const UPSTREAM_SHARE: usize = 4;

/// Builds stage prompts from a [`Context`]
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Prompt for the UserFlows stage
    pub fn user_flows(&self, context: &Context) -> String {
        let head = format!(
            "Analyze this {} application and describe its user flows.\n\
             Use ONLY the routes, components and API endpoints listed below.\n\n",
            context.framework
        );
        let tail = "\n\nOUTPUT FORMAT - describe each flow with this structure:\n\n\
            ## Flow: [Flow name based on actual components]\n\n\
            - **Route**: [Actual route from the routes list]\n\
            - **Components**: [Actual component names, comma separated]\n\
            - **UI Elements**:\n\
            \x20 - [Button text, form fields and input placeholders from the components]\n\
            - **Steps**:\n\
            \x20 1. [User action based on actual component functionality]\n\
            \x20 2. [System response, validation or navigation]\n\n\
            Use the exact names found in the code. Do not invent routes or components.\n";
        self.bounded(&head, &context_section(context), None, tail)
    }

    /// Prompt for one Generate stage. Names only the kind's own file.
    pub fn generate(&self, kind: TestKind, context: &Context, user_flows: &str) -> String {
        let file = kind.file_name();
        let head = format!(
            "Generate ONLY {file} for this {framework} application, a Playwright \
             test file of {title}.\n\n",
            framework = context.framework,
            title = kind.title().to_lowercase(),
        );
        let tail = format!(
            "\n\nREQUIREMENTS FOR {title}:\n{instructions}\n\n\
             TECHNICAL REQUIREMENTS:\n\
             - Mock all API calls with page.route()\n\
             - Use realistic selectors based on the UI elements listed above\n\
             - Write 3-5 assertions per test\n\n\
             REQUIRED FORMAT:\n\
             {file}:\n\
             ```typescript\n\
             import {{ test, expect }} from '@playwright/test';\n\
             // tests\n\
             ```\n",
            title = kind.title().to_uppercase(),
            instructions = kind.instructions(),
        );
        self.bounded(
            &head,
            &context_section(context),
            Some(("USER FLOWS", user_flows)),
            &tail,
        )
    }

    fn bounded(
        &self,
        head: &str,
        context: &str,
        upstream: Option<(&str, &str)>,
        tail: &str,
    ) -> String {
        let upstream_label = upstream
            .map(|(label, _)| format!("\n\n{}:\n", label))
            .unwrap_or_default();
        let upstream_text = upstream.map(|(_, text)| text.trim()).unwrap_or("");

        let fixed = char_len(head) + char_len(tail) + char_len(&upstream_label);
        let available = self.max_chars.saturating_sub(fixed);
        let context_len = char_len(context);
        let upstream_len = char_len(upstream_text);

        let reserve = upstream_len.min(available / UPSTREAM_SHARE);

        let (context, upstream_text) = if context_len + upstream_len <= available {
            (context.to_string(), upstream_text.to_string())
        } else if context_len + reserve <= available {
            (
                context.to_string(),
                truncate_chars(upstream_text, available - context_len),
            )
        } else {
            (
                truncate_chars(context, available - reserve),
                truncate_chars(upstream_text, reserve),
            )
        };

        let mut prompt = String::with_capacity(self.max_chars.min(fixed + available));
        prompt.push_str(head);
        prompt.push_str(&context);
        if upstream.is_some() {
            prompt.push_str(&upstream_label);
            prompt.push_str(&upstream_text);
        }
        prompt.push_str(tail);

        if char_len(&prompt) > self.max_chars {
            prompt = prompt.chars().take(self.max_chars).collect();
        }
        prompt
    }
}

/// The facts of a context as prompt text
pub fn context_section(context: &Context) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FRAMEWORK: {}", context.framework);

    if context.is_empty() {
        let _ = writeln!(
            out,
            "\n{}:\nNo routes/components/API calls were detected in this repository. \
             Describe the generic flows a user would follow in a {} application.",
            NO_FACTS_HEADING, context.framework
        );
        return out;
    }

    let _ = writeln!(out, "\nROUTES FOUND ({}):", context.routes.len());
    for route in &context.routes {
        let guard = if route.guarded { " (requires authentication)" } else { "" };
        let _ = writeln!(out, "- {} [{}]{}", route.path, route.file, guard);
    }

    let _ = writeln!(out, "\nCOMPONENTS DETECTED ({}):", context.components.len());
    for component in &context.components {
        let flags = component.behavior.flags();
        if flags.is_empty() {
            let _ = writeln!(out, "- {} [{}]", component.name, component.file);
        } else {
            let _ = writeln!(
                out,
                "- {} [{}]: {}",
                component.name,
                component.file,
                flags.join(", ")
            );
        }
        for element in &component.ui_elements {
            let _ = writeln!(out, "  - {}", element);
        }
    }

    let forms: Vec<&str> = context
        .components
        .iter()
        .filter(|c| {
            c.behavior.form_submit || c.ui_elements.iter().any(|e| e.kind == UiElementKind::Form)
        })
        .map(|c| c.name.as_str())
        .collect();
    if !forms.is_empty() {
        let _ = writeln!(out, "\nFORM COMPONENTS: {}", forms.join(", "));
    }

    let _ = writeln!(out, "\nAPI ENDPOINTS ({}):", context.api_calls.len());
    for call in &context.api_calls {
        let _ = writeln!(out, "- {} {} (from {})", call.method, call.path, call.component.name);
    }

    let key = context.key_components(KEY_COMPONENT_LIMIT);
    if context.graph.edge_count() > 0 && !key.is_empty() {
        let _ = writeln!(out, "\nKEY COMPONENTS (most used):");
        for component in key {
            let deps: Vec<String> = context
                .graph
                .dependencies_of(&component.id())
                .into_iter()
                .map(|id| id.name)
                .collect();
            if deps.is_empty() {
                let _ = writeln!(out, "- {}", component.name);
            } else {
                let _ = writeln!(out, "- {} (uses {})", component.name, deps.join(", "));
            }
        }
    }

    if context.truncated {
        let _ = writeln!(out, "\nNOTE: the fact list was truncated to fit the size budget.");
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut `s` to at most `max` characters, marking the cut when there is room
fn truncate_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    let marker_len = char_len(TRUNCATION_MARKER);
    if max <= marker_len {
        return s.chars().take(max).collect();
    }
    let mut cut: String = s.chars().take(max - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
