// Structural capture of model responses

use super::stage::StageName;
use serde::{Deserialize, Serialize};

const FLOW_MARKER: &str = "## Flow:";

/// One user flow described by the UserFlows stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFlow {
    pub name: String,
    pub route: Option<String>,
    pub components: Vec<String>,
    pub ui_elements: Vec<String>,
    pub steps: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    UiElements,
    Steps,
}

/// Parse every `## Flow:` block of a UserFlows response.
///
/// Sub-items are `- **Route**:`, `- **Components**:`, `- **UI Elements**:`
/// and `- **Steps**:`; the last two take their values from the indented list
/// that follows. Unknown lines are ignored.
pub fn parse_user_flows(text: &str) -> Vec<UserFlow> {
    let mut flows = Vec::new();
    let mut current: Option<UserFlow> = None;
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix(FLOW_MARKER) {
            if let Some(flow) = current.take() {
                flows.push(flow);
            }
            current = Some(UserFlow {
                name: strip_emphasis(name),
                ..UserFlow::default()
            });
            section = Section::None;
            continue;
        }
        let Some(flow) = current.as_mut() else {
            continue;
        };
        if line.starts_with("## ") || line.starts_with("# ") {
            flows.extend(current.take());
            section = Section::None;
            continue;
        }

        if let Some((key, value)) = field(line) {
            section = Section::None;
            match key.to_ascii_lowercase().as_str() {
                "route" => flow.route = Some(value.trim_matches('`').to_string()).filter(|r| !r.is_empty()),
                "components" => {
                    flow.components = value
                        .split(',')
                        .map(|c| c.trim().trim_matches('`').to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                }
                "ui elements" => section = Section::UiElements,
                "steps" => section = Section::Steps,
                _ => {}
            }
            continue;
        }

        match section {
            Section::Steps => {
                if let Some(step) = list_item(line) {
                    flow.steps.push(step);
                }
            }
            Section::UiElements => {
                if let Some(item) = list_item(line) {
                    flow.ui_elements.push(item);
                }
            }
            Section::None => {}
        }
    }
    flows.extend(current);
    flows
}

/// `- **Key**: value` → `(Key, value)`
fn field(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("- **").or_else(|| line.strip_prefix("* **"))?;
    let (key, value) = rest.split_once("**")?;
    let value = value.strip_prefix(':').unwrap_or(value);
    Some((key.trim_end_matches(':').trim(), value.trim()))
}

/// Text of a numbered or bulleted list item
fn list_item(line: &str) -> Option<String> {
    let item = if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        rest
    } else {
        let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))?
    };
    let item = item.trim();
    (!item.is_empty()).then(|| item.to_string())
}

fn strip_emphasis(s: &str) -> String {
    s.trim().trim_matches('*').trim().to_string()
}

/// Body of the first fenced code block that has content. Blank blocks are
/// skipped.
pub fn first_code_block(text: &str) -> Option<String> {
    let mut body: Option<Vec<&str>> = None;
    for line in text.lines() {
        let fence = line.trim_start().starts_with("```");
        match body.as_mut() {
            None if fence => body = Some(Vec::new()),
            None => {}
            Some(lines) if fence => {
                if !is_blank(lines) {
                    return Some(join_lines(lines));
                }
                body = None;
            }
            Some(lines) => lines.push(line),
        }
    }
    // an unterminated fence still carries the code
    body.filter(|lines| !is_blank(lines)).map(|lines| join_lines(&lines))
}

fn is_blank(lines: &[&str]) -> bool {
    lines.iter().all(|line| line.trim().is_empty())
}

fn join_lines(lines: &[&str]) -> String {
    let mut code = lines.join("\n");
    code.push('\n');
    code
}

/// Test file content for a Generate artifact: the first fenced block, or the
/// whole response when there is none
pub fn test_source(text: &str) -> String {
    first_code_block(text).unwrap_or_else(|| {
        let mut body = text.trim().to_string();
        body.push('\n');
        body
    })
}

/// Check that a response has the structure its stage requires
pub fn validate(stage: StageName, text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("empty response".to_string());
    }
    match stage {
        StageName::Analyze => Ok(()),
        StageName::UserFlows => {
            if text.contains(FLOW_MARKER) {
                Ok(())
            } else {
                Err(format!("no '{}' marker in response", FLOW_MARKER))
            }
        }
        StageName::Generate(_) => {
            let has_fence = first_code_block(text).is_some();
            let has_test = text.contains("test(") || text.contains("test.describe(");
            if has_fence || has_test {
                Ok(())
            } else {
                Err("no code block or test() call in response".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::TestKind;

    const FLOWS: &str = "\
Here are the flows.

---
## Flow: **User Login**

- **Route**: `/login`
- **Components**: LoginForm, AuthProvider
- **UI Elements**:
  - Email input
  - \"Sign In\" button
- **Steps**:
  1. Open /login
  2. Enter email and password
  3. Click \"Sign In\"

## Flow: Browse Dashboard
- **Route**: /dashboard
- **Steps**:
  1. Open the dashboard
";

    #[test]
    fn test_parse_user_flows() {
        let flows = parse_user_flows(FLOWS);
        assert_eq!(flows.len(), 2);

        let login = &flows[0];
        assert_eq!(login.name, "User Login");
        assert_eq!(login.route.as_deref(), Some("/login"));
        assert_eq!(login.components, vec!["LoginForm", "AuthProvider"]);
        assert_eq!(login.ui_elements, vec!["Email input", "\"Sign In\" button"]);
        assert_eq!(login.steps.len(), 3);
        assert_eq!(login.steps[2], "Click \"Sign In\"");

        assert_eq!(flows[1].name, "Browse Dashboard");
        assert!(flows[1].components.is_empty());
        assert_eq!(flows[1].steps, vec!["Open the dashboard"]);
    }

    #[test]
    fn test_parse_without_flows() {
        assert!(parse_user_flows("nothing useful").is_empty());
    }

    #[test]
    fn test_first_code_block() {
        let text = "visual.spec.ts:\n```typescript\nimport { test } from '@playwright/test';\ntest('a', async () => {});\n```\ntrailing";
        assert_eq!(
            first_code_block(text).unwrap(),
            "import { test } from '@playwright/test';\ntest('a', async () => {});\n"
        );
        assert_eq!(first_code_block("```ts\nconst a = 1;").unwrap(), "const a = 1;\n");
        assert_eq!(first_code_block("no fence"), None);
    }

    #[test]
    fn test_test_source_falls_back_to_whole_text() {
        assert_eq!(test_source("  test('x', () => {})  "), "test('x', () => {})\n");
    }

    #[test]
    fn test_validate() {
        assert!(validate(StageName::UserFlows, FLOWS).is_ok());
        assert!(validate(StageName::UserFlows, "Sorry, I cannot help").is_err());
        assert!(validate(StageName::UserFlows, "   ").is_err());

        let stage = StageName::Generate(TestKind::Visual);
        assert!(validate(stage, "```ts\nx\n```").is_ok());
        assert!(validate(stage, "test.describe('a', () => {})").is_ok());
        assert!(validate(stage, "Here is some advice about testing.").is_err());
    }

    #[test]
    fn test_empty_fence_is_not_a_test_file() {
        let stage = StageName::Generate(TestKind::Visual);
        assert!(validate(stage, "Here is visual.spec.ts:\n```typescript\n```\n").is_err());
        assert!(validate(stage, "```ts\n   \n\n```").is_err());
        assert_eq!(first_code_block("```typescript\n```\n"), None);

        let text = "```\n```\nThen:\n```ts\ntest('a', async () => {});\n```";
        assert_eq!(first_code_block(text).unwrap(), "test('a', async () => {});\n");
        assert!(validate(stage, text).is_ok());
    }
}
