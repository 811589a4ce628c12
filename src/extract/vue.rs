// Vue single-file components

use super::facts::{Component, FileFacts};
use super::rules::ExtractionRule;
use super::ui;
use crate::scan::SourceFile;

static_regex!(template_re, r"(?s)<template[^>]*>(.*)</template>");
static_regex!(script_re, r"(?s)<script[^>]*>(.*?)</script>");
static_regex!(name_option_re, r#"\bname\s*:\s*["']([A-Za-z][\w-]*)["']"#);

/// A `.vue` file declares exactly one component. Its name comes from the
/// `name` option when present, otherwise from the file name.
pub(crate) fn sfc_component(file: &SourceFile) -> Option<FileFacts> {
    if file.extension != "vue" {
        return None;
    }
    let content = &file.content;
    let template = template_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content.as_str(), |m| m.as_str());
    let script = script_re()
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let declared = name_option_re()
        .captures(&script)
        .and_then(|c| c.get(1))
        .map(|m| ui::pascal_case(m.as_str()));
    let name = declared.unwrap_or_else(|| ui::pascal_case(file.stem()));
    if name.is_empty() {
        return None;
    }

    let mut component = Component::new(name, file.display_path());
    component.ui_elements = ui::ui_elements(template);
    component.behavior = ui::behavior(content);

    let mut facts = FileFacts::new();
    facts.push_component(0, component);
    Some(facts)
}

/// One component per `.vue` file
pub struct SfcComponentRule;

impl SfcComponentRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SfcComponentRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionRule for SfcComponentRule {
    fn name(&self) -> &'static str {
        "vue-sfc"
    }

    fn extract(&self, file: &SourceFile) -> Option<FileFacts> {
        sfc_component(file)
    }
}
