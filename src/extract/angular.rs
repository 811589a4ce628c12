// Angular: @Component classes and their external templates

use super::facts::{Component, FileFacts};
use super::rules::ExtractionRule;
use super::ui;
use crate::scan::SourceFile;

static_regex!(
    component_class_re,
    r"(?s)@Component\s*\(\s*\{(.*?)\}\s*\)\s*(?:export\s+)?(?:default\s+)?class\s+(\w+)"
);
static_regex!(inline_template_re, r"(?s)\btemplate\s*:\s*`([^`]*)`");

/// Classes decorated with `@Component`; inline templates are scanned for UI
pub struct ComponentClassRule;

impl ComponentClassRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ComponentClassRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for ComponentClassRule {
    fn name(&self) -> &'static str {
        "angular-components"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        if file.extension != "ts" {
            return None;
        }
        let content = &file.content;
        let found: Vec<(usize, String, String)> = component_class_re()
            .captures_iter(content)
            .filter_map(|caps| {
                Some((
                    caps.get(0)?.start(),
                    caps.get(2)?.as_str().to_string(),
                    caps.get(1)?.as_str().to_string(),
                ))
            })
            .collect();

        let mut facts = FileFacts::new();
        for (i, (start, name, decorator)) in found.iter().enumerate() {
            let end = found.get(i + 1).map_or(content.len(), |(next, _, _)| *next);
            let body = &content[*start..end];
            let mut component = Component::new(name.clone(), file.display_path());
            if let Some(template) = inline_template_re().captures(decorator).and_then(|c| c.get(1)) {
                component.ui_elements = ui::ui_elements(template.as_str());
            }
            component.behavior = ui::behavior(body);
            facts.push_component(*start, component);
        }

        if facts.components.is_empty() {
            None
        } else {
            Some(facts)
        }
    }
}

/// `login.component.html` describes the UI of `LoginComponent` declared in
/// the sibling `login.component.ts`
pub struct TemplateFileRule;

impl TemplateFileRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TemplateFileRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for TemplateFileRule {
    fn name(&self) -> &'static str {
        "angular-templates"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        let base = file.file_name().strip_suffix(".component.html")?;
        let name = format!("{}Component", ui::pascal_case(base));
        let path = file.display_path();
        let class_file = format!("{}.ts", path.strip_suffix(".html")?);

        let mut component = Component::new(name, class_file);
        component.ui_elements = ui::ui_elements(&file.content);
        component.behavior = ui::behavior(&file.content);

        let mut facts = FileFacts::new();
        facts.push_component(0, component);
        Some(facts)
    }
}
