// Stage identities and the standard stage graph

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of Playwright test file a Generate stage produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Visual,
    Flow,
    Component,
    Accessibility,
}

impl TestKind {
    pub const ALL: [TestKind; 4] = [
        TestKind::Visual,
        TestKind::Flow,
        TestKind::Component,
        TestKind::Accessibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Visual => "visual",
            TestKind::Flow => "flow",
            TestKind::Component => "component",
            TestKind::Accessibility => "accessibility",
        }
    }

    /// Name of the generated test file
    pub fn file_name(&self) -> String {
        format!("{}.spec.ts", self.as_str())
    }

    pub fn title(&self) -> &'static str {
        match self {
            TestKind::Visual => "Visual Tests",
            TestKind::Flow => "Flow Tests",
            TestKind::Component => "Component Tests",
            TestKind::Accessibility => "Accessibility Tests",
        }
    }

    /// What tests of this kind must cover
    pub fn instructions(&self) -> &'static str {
        match self {
            TestKind::Visual => {
                "- Test responsive layouts at mobile (320px), tablet (768px) and desktop (1920px) widths with page.setViewportSize()\n\
                 - Test loading, error and empty states of each route\n\
                 - Test navigation visibility on every viewport\n\
                 - Test theme switching when the application offers it"
            }
            TestKind::Flow => {
                "- Implement each user flow above as one test, following its steps in order\n\
                 - Use the exact routes, component names, button text and input placeholders from the flows\n\
                 - Mock every API endpoint a flow touches with page.route() and realistic JSON\n\
                 - Cover both the success path and the error path of each flow"
            }
            TestKind::Component => {
                "- Exercise the interactive elements named in the flows: buttons, inputs, selects, forms and links\n\
                 - Test form validation and submission\n\
                 - Test dialogs, dropdowns and filters the flows mention\n\
                 - Use the exact labels and placeholders extracted from the components"
            }
            TestKind::Accessibility => {
                "- Check ARIA labels and roles on every interactive element\n\
                 - Test keyboard navigation with Tab, Enter and Escape\n\
                 - Test focus management and focus trapping in dialogs\n\
                 - Ensure every button and link is reachable from the keyboard"
            }
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown test kind: {}", s))
    }
}

/// One unit of pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StageName {
    /// Local: scan, extract and assemble the Context
    Analyze,
    UserFlows,
    Generate(TestKind),
}

impl StageName {
    /// File-system safe name used for artifact and transcript files
    pub fn slug(&self) -> String {
        match self {
            StageName::Analyze => "analyze".to_string(),
            StageName::UserFlows => "user-flows".to_string(),
            StageName::Generate(kind) => format!("generate-{}", kind),
        }
    }

    /// Whether the stage runs without the gateway
    pub fn is_local(&self) -> bool {
        matches!(self, StageName::Analyze)
    }

    pub fn test_kind(&self) -> Option<TestKind> {
        match self {
            StageName::Generate(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Analyze => f.write_str("Analyze"),
            StageName::UserFlows => f.write_str("UserFlows"),
            StageName::Generate(kind) => write!(f, "Generate:{}", kind),
        }
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "analyze" => Ok(StageName::Analyze),
            "userflows" | "user-flows" | "user_flows" => Ok(StageName::UserFlows),
            other => {
                let kind = other
                    .strip_prefix("generate:")
                    .or_else(|| other.strip_prefix("generate-"))
                    .ok_or_else(|| format!("unknown stage: {}", s))?;
                Ok(StageName::Generate(kind.parse()?))
            }
        }
    }
}

impl From<StageName> for String {
    fn from(stage: StageName) -> Self {
        stage.to_string()
    }
}

impl TryFrom<String> for StageName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stage and the stages that must complete before it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: StageName,
    pub depends_on: Vec<StageName>,
}

/// Analyze, then UserFlows, then the four Generate siblings, in declared order
pub fn standard_stages() -> Vec<StageSpec> {
    let mut stages = vec![
        StageSpec {
            name: StageName::Analyze,
            depends_on: Vec::new(),
        },
        StageSpec {
            name: StageName::UserFlows,
            depends_on: vec![StageName::Analyze],
        },
    ];
    stages.extend(TestKind::ALL.into_iter().map(|kind| StageSpec {
        name: StageName::Generate(kind),
        depends_on: vec![StageName::UserFlows],
    }));
    stages
}
