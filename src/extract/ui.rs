// Markup helpers shared by every component rule

use super::facts::{Behavior, UiElement, UiElementKind};

/// Longest label kept for a UI element, in characters
pub const MAX_LABEL_CHARS: usize = 80;

static_regex!(button_re, r"(?is)<button\b((?:=>|[^>])*)>(.*?)</button\s*>");
static_regex!(submit_input_re, r#"(?i)<input\b[^>]*\btype\s*=\s*["'](?:submit|button)["'][^>]*>"#);
static_regex!(input_re, r"(?i)<input\b((?:=>|[^>])*?)/?>");
static_regex!(textarea_re, r"(?i)<textarea\b((?:=>|[^>])*)>");
static_regex!(select_re, r"(?i)<select\b((?:=>|[^>])*)>");
static_regex!(form_re, r"(?i)<form\b((?:=>|[^>])*)>");
static_regex!(
    link_re,
    r"(?s)<(?:a|Link|NavLink|RouterLink|router-link)\b((?:=>|[^>])*)>(.*?)</(?:a|Link|NavLink|RouterLink|router-link)\s*>"
);
static_regex!(
    attr_re,
    r#"([:@\w\-\[\]()]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|\{\s*["'`]([^"'`]*)["'`]\s*\})"#
);
static_regex!(tag_re, r"<[^>]*>");
static_regex!(expr_re, r"\{[^}]*\}");
static_regex!(svelte_reactive_re, r"(?m)^\s*\$:");

const LOCAL_STATE: &[&str] = &["useState", "useReducer", "ref(", "reactive(", "signal(", "$state"];
const SIDE_EFFECTS: &[&str] = &["useEffect", "useLayoutEffect", "onMounted", "ngOnInit", "onMount"];
const GLOBAL_STORE: &[&str] = &[
    "useSelector",
    "useDispatch",
    "useStore",
    "useContext",
    "inject(Store)",
    "defineStore",
    "writable(",
];
const FORM_SUBMIT: &[&str] = &["onSubmit", "@submit", "(ngSubmit)", "on:submit", "handleSubmit"];

/// All interactive elements in `markup`, in document order
pub fn ui_elements(markup: &str) -> Vec<UiElement> {
    let mut found: Vec<(usize, UiElement)> = Vec::new();

    for caps in button_re().captures_iter(markup) {
        let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
        let label = clean_label(caps.get(2).map_or("", |m| m.as_str()))
            .or_else(|| first_attr(&attrs, &["aria-label", "title"]));
        found.push((caps.get(0).map_or(0, |m| m.start()), UiElement::new(UiElementKind::Button, label)));
    }

    for m in submit_input_re().find_iter(markup) {
        let attrs = attributes(m.as_str());
        let label = first_attr(&attrs, &["value", "aria-label"]);
        found.push((m.start(), UiElement::new(UiElementKind::Button, label)));
    }

    for caps in input_re().captures_iter(markup) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        if submit_input_re().is_match(whole) {
            continue;
        }
        let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
        let label = first_attr(&attrs, &["placeholder", "aria-label", "name", "id"]);
        let kind = first_attr(&attrs, &["type"]).or_else(|| Some("text".to_string()));
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            UiElement::new(UiElementKind::Input, label).with_detail(kind),
        ));
    }

    for (re, kind, keys) in [
        (textarea_re(), UiElementKind::TextArea, &["placeholder", "aria-label", "name", "id"][..]),
        (select_re(), UiElementKind::Select, &["aria-label", "name", "id"][..]),
        (form_re(), UiElementKind::Form, &["aria-label", "name", "id", "[formGroup]"][..]),
    ] {
        for caps in re.captures_iter(markup) {
            let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
            found.push((caps.get(0).map_or(0, |m| m.start()), UiElement::new(kind, first_attr(&attrs, keys))));
        }
    }

    for caps in link_re().captures_iter(markup) {
        let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
        let target = first_attr(&attrs, &["to", "href", "routerLink", ":to"]);
        if target.is_none() {
            continue;
        }
        let label = clean_label(caps.get(2).map_or("", |m| m.as_str()));
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            UiElement::new(UiElementKind::Link, label).with_detail(target),
        ));
    }

    found.sort_by_key(|(offset, _)| *offset);
    let mut elements: Vec<UiElement> = Vec::with_capacity(found.len());
    for (_, element) in found {
        if !elements.contains(&element) {
            elements.push(element);
        }
    }
    elements
}

/// Behavior flags for a component body
pub fn behavior(source: &str) -> Behavior {
    let any = |markers: &[&str]| markers.iter().any(|m| source.contains(m));
    Behavior {
        local_state: any(LOCAL_STATE) || svelte_reactive_re().is_match(source),
        side_effects: any(SIDE_EFFECTS),
        global_store: any(GLOBAL_STORE),
        form_submit: any(FORM_SUBMIT),
    }
}

/// Visible text of a markup fragment: tags and `{expressions}` removed,
/// whitespace collapsed, capped at [`MAX_LABEL_CHARS`]
pub fn clean_label(raw: &str) -> Option<String> {
    let without_tags = tag_re().replace_all(raw, " ");
    let text = expr_re().replace_all(&without_tags, " ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_LABEL_CHARS).collect())
}

/// Name/value pairs of the quoted attributes in a tag
pub fn attributes(tag: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))?
                .as_str()
                .to_string();
            Some((name, value))
        })
        .collect()
}

/// First non-empty attribute among `names`, as a cleaned label
pub fn first_attr(attrs: &[(String, String)], names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        attrs
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| clean_label(value))
    })
}

/// `login-form` / `login_form` / `loginForm` → `LoginForm`
pub fn pascal_case(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
