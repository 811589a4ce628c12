// Structural facts extracted from source files

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a component: its name plus the file declaring it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub name: String,
    pub file: String,
}

impl ComponentId {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.file)
    }
}

/// A declared route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path pattern, always rooted (`/users/:id`)
    pub path: String,
    /// File the declaration was found in
    pub file: String,
    /// Whether an auth guard protects the route
    #[serde(default)]
    pub guarded: bool,
}

impl Route {
    pub fn new(path: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file: file.into(),
            guarded: false,
        }
    }

    pub fn guarded(mut self, guarded: bool) -> Self {
        self.guarded = guarded;
        self
    }
}

/// Kind of interactive element found in markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiElementKind {
    Button,
    Input,
    TextArea,
    Select,
    Form,
    Link,
}

impl UiElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiElementKind::Button => "button",
            UiElementKind::Input => "input",
            UiElementKind::TextArea => "textarea",
            UiElementKind::Select => "select",
            UiElementKind::Form => "form",
            UiElementKind::Link => "link",
        }
    }
}

/// An interactive element with its visible label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiElement {
    pub kind: UiElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Input type or link target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UiElement {
    pub fn new(kind: UiElementKind, label: Option<String>) -> Self {
        Self {
            kind,
            label,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

impl fmt::Display for UiElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(detail) = &self.detail {
            write!(f, "[{}]", detail)?;
        }
        if let Some(label) = &self.label {
            write!(f, " \"{}\"", label)?;
        }
        Ok(())
    }
}

/// Stateful behavior detected in a component body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    pub local_state: bool,
    pub side_effects: bool,
    pub global_store: bool,
    pub form_submit: bool,
}

impl Behavior {
    pub fn union(self, other: Behavior) -> Behavior {
        Behavior {
            local_state: self.local_state || other.local_state,
            side_effects: self.side_effects || other.side_effects,
            global_store: self.global_store || other.global_store,
            form_submit: self.form_submit || other.form_submit,
        }
    }

    /// Names of the flags that are set
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.local_state {
            flags.push("local state");
        }
        if self.side_effects {
            flags.push("side effects");
        }
        if self.global_store {
            flags.push("global store");
        }
        if self.form_submit {
            flags.push("form submit");
        }
        flags
    }
}

/// A UI component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub ui_elements: Vec<UiElement>,
    #[serde(default)]
    pub behavior: Behavior,
}

impl Component {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            ui_elements: Vec::new(),
            behavior: Behavior::default(),
        }
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::new(&self.name, &self.file)
    }

    /// Merge another sighting of the same component (e.g. an external template)
    pub fn absorb(&mut self, other: Component) {
        for element in other.ui_elements {
            if !self.ui_elements.contains(&element) {
                self.ui_elements.push(element);
            }
        }
        self.behavior = self.behavior.union(other.behavior);
    }

    /// Buttons, in declaration order
    pub fn buttons(&self) -> impl Iterator<Item = &UiElement> {
        self.ui_elements
            .iter()
            .filter(|e| e.kind == UiElementKind::Button)
    }
}

/// HTTP method of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse a method name in any case
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call to a backend endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiCall {
    pub method: HttpMethod,
    pub path: String,
    /// Component the call originates from
    pub component: ComponentId,
}

/// One import statement: the module specifier plus the names it binds.
/// `names` is empty for side-effect and namespace imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    pub specifier: String,
    #[serde(default)]
    pub names: Vec<String>,
}

impl ImportRef {
    pub fn new(specifier: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            specifier: specifier.into(),
            names,
        }
    }
}

/// A file no rule could extract facts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionWarning {
    pub path: String,
    pub reason: String,
}

/// Facts found in a single file.
///
/// Offsets are byte positions of each declaration; they let API calls be
/// attributed to the component that encloses them.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub routes: Vec<Route>,
    pub components: Vec<Component>,
    pub api_calls: Vec<ApiCall>,
    pub imports: Vec<ImportRef>,
    component_offsets: Vec<usize>,
    api_offsets: Vec<usize>,
}

impl FileFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_component(&mut self, offset: usize, component: Component) {
        self.component_offsets.push(offset);
        self.components.push(component);
    }

    pub fn push_api_call(&mut self, offset: usize, call: ApiCall) {
        self.api_offsets.push(offset);
        self.api_calls.push(call);
    }

    /// Record an import, folding repeated specifiers together
    pub fn add_import(&mut self, import: ImportRef) {
        match self.imports.iter_mut().find(|i| i.specifier == import.specifier) {
            Some(existing) => {
                for name in import.names {
                    if !existing.names.contains(&name) {
                        existing.names.push(name);
                    }
                }
            }
            None => self.imports.push(import),
        }
    }

    /// Whether any route, component or API call was found
    pub fn has_facts(&self) -> bool {
        !self.routes.is_empty() || !self.components.is_empty() || !self.api_calls.is_empty()
    }

    /// Append facts produced by another rule for the same file
    pub fn merge(&mut self, other: FileFacts) {
        self.routes.extend(other.routes);
        self.components.extend(other.components);
        self.component_offsets.extend(other.component_offsets);
        self.api_calls.extend(other.api_calls);
        self.api_offsets.extend(other.api_offsets);
        for import in other.imports {
            self.add_import(import);
        }
    }

    /// Point every API call at the nearest component declared before it,
    /// falling back to the first component, or keep the file-level reference
    /// when the file declares none.
    pub fn attribute_api_calls(&mut self) {
        if self.components.is_empty() {
            return;
        }
        for (call, &offset) in self.api_calls.iter_mut().zip(&self.api_offsets) {
            let owner = self
                .component_offsets
                .iter()
                .enumerate()
                .filter(|(_, &start)| start <= offset)
                .max_by_key(|(_, &start)| start)
                .map(|(i, _)| i)
                .unwrap_or(0);
            call.component = self.components[owner].id();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_absorb_unions() {
        let mut a = Component::new("Login", "login.component.ts");
        a.ui_elements.push(UiElement::new(UiElementKind::Button, Some("Go".into())));
        a.behavior.local_state = true;

        let mut b = Component::new("Login", "login.component.ts");
        b.ui_elements.push(UiElement::new(UiElementKind::Button, Some("Go".into())));
        b.ui_elements.push(UiElement::new(UiElementKind::Input, Some("email".into())));
        b.behavior.form_submit = true;

        a.absorb(b);
        assert_eq!(a.ui_elements.len(), 2);
        assert!(a.behavior.local_state && a.behavior.form_submit);
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("POST"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("delete"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("head"), None);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_attribute_api_calls_to_enclosing_component() {
        let mut facts = FileFacts::new();
        facts.push_component(0, Component::new("List", "a.tsx"));
        facts.push_component(100, Component::new("Detail", "a.tsx"));
        let file_ref = ComponentId::new("a", "a.tsx");
        facts.push_api_call(
            50,
            ApiCall { method: HttpMethod::Get, path: "/api/items".into(), component: file_ref.clone() },
        );
        facts.push_api_call(
            150,
            ApiCall { method: HttpMethod::Get, path: "/api/items/1".into(), component: file_ref },
        );

        facts.attribute_api_calls();
        assert_eq!(facts.api_calls[0].component.name, "List");
        assert_eq!(facts.api_calls[1].component.name, "Detail");
    }

    #[test]
    fn test_attribute_keeps_file_reference_without_components() {
        let mut facts = FileFacts::new();
        facts.push_api_call(
            10,
            ApiCall {
                method: HttpMethod::Post,
                path: "/api/login".into(),
                component: ComponentId::new("auth", "src/api/auth.ts"),
            },
        );
        facts.attribute_api_calls();
        assert_eq!(facts.api_calls[0].component.name, "auth");
    }

    #[test]
    fn test_repeated_imports_fold() {
        let mut facts = FileFacts::new();
        facts.add_import(ImportRef::new("./a", vec!["A".into()]));
        facts.add_import(ImportRef::new("./a", vec!["B".into(), "A".into()]));
        facts.add_import(ImportRef::new("./b", vec![]));
        assert_eq!(facts.imports.len(), 2);
        assert_eq!(facts.imports[0].names, vec!["A", "B"]);
    }

    #[test]
    fn test_ui_element_display() {
        let el = UiElement::new(UiElementKind::Input, Some("Email".into()))
            .with_detail(Some("email".into()));
        assert_eq!(el.to_string(), "input[email] \"Email\"");
    }

    #[test]
    fn test_behavior_flags() {
        let behavior = Behavior {
            local_state: true,
            form_submit: true,
            ..Behavior::default()
        };
        assert_eq!(behavior.flags(), vec!["local state", "form submit"]);
    }
}
