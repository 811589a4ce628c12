// Template engine for the Markdown reports

use super::report::{RunReport, UserFlowsReport};
use crate::error::Result;
use crate::pipeline::slugify;
use std::collections::HashMap;
use tera::{Context, Tera, Value};

type FilterArgs = HashMap<String, Value>;

/// Tera with the embedded report templates and Markdown filters
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("user_flows.md", include_str!("../../templates/user_flows.md.tera")),
            ("run_report.md", include_str!("../../templates/run_report.md.tera")),
        ])?;

        tera.register_filter("table_cell", table_cell);
        tera.register_filter("pluralize", pluralize);
        tera.register_filter("slugify", |value: &Value, _: &FilterArgs| {
            Ok(Value::String(slugify(value.as_str().unwrap_or_default())))
        });

        Ok(Self { tera })
    }

    pub fn render_user_flows(&self, report: &UserFlowsReport) -> Result<String> {
        self.render_serialized("user_flows.md", report)
    }

    pub fn render_run_report(&self, report: &RunReport) -> Result<String> {
        self.render_serialized("run_report.md", report)
    }

    fn render_serialized<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<String> {
        let context = Context::from_serialize(value)?;
        Ok(self.tera.render(name, &context)?)
    }
}

/// Flatten text for a Markdown table cell: one line, pipes escaped, at most
/// `max` characters
fn table_cell(value: &Value, args: &FilterArgs) -> tera::Result<Value> {
    let text = value.as_str().unwrap_or_default();
    let max = args.get("max").and_then(Value::as_u64).unwrap_or(80) as usize;

    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cell: String = flat.chars().take(max).collect();
    if flat.chars().count() > max {
        cell.push('…');
    }
    Ok(Value::String(cell.replace('|', "\\|")))
}

/// `3 | pluralize(singular="flow")` renders as `3 flows`
fn pluralize(value: &Value, args: &FilterArgs) -> tera::Result<Value> {
    let count = value.as_u64().unwrap_or_default();
    let singular = args
        .get("singular")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("pluralize requires a `singular` argument"))?;
    let word = match (count, args.get("plural").and_then(Value::as_str)) {
        (1, _) => singular.to_string(),
        (_, Some(plural)) => plural.to_string(),
        (_, None) => format!("{}s", singular),
    };
    Ok(Value::String(format!("{} {}", count, word)))
}
