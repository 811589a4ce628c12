// Report generator
//
// Writes the files a run leaves behind: user_flows.md, run_report.md and
// code_graph.dot in the report directory, and one test file per completed
// Generate stage in the output directory.

use super::diagrams::DiagramGenerator;
use super::templates::TemplateEngine;
use super::test_files::write_test_file;
use crate::analysis::Context;
use crate::config::OutputConfig;
use crate::error::Result;
use crate::pipeline::{
    parse_user_flows, ArtifactStore, PipelineRun, StageName, StageState, TestKind, UserFlow,
};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const USER_FLOWS_FILE: &str = "user_flows.md";
pub const RUN_REPORT_FILE: &str = "run_report.md";
pub const GRAPH_FILE: &str = "code_graph.dot";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Data rendered into `user_flows.md`
#[derive(Debug, Clone, Serialize)]
pub struct UserFlowsReport {
    pub title: String,
    pub generated_at: String,
    pub repository: String,
    pub flows: Vec<UserFlow>,
    /// The raw response, kept when no flow could be parsed from it
    pub raw: Option<String>,
}

impl UserFlowsReport {
    pub fn new(repository: impl Into<String>, text: &str) -> Self {
        let flows = parse_user_flows(text);
        let raw = if flows.is_empty() && !text.trim().is_empty() {
            Some(text.trim().to_string())
        } else {
            None
        };
        Self {
            title: "User Flows".to_string(),
            generated_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            repository: repository.into(),
            flows,
            raw,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRow {
    pub stage: String,
    pub state: String,
    pub attempts: u32,
    pub error: Option<String>,
    pub artifact: bool,
}

/// Data rendered into `run_report.md`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub repository: String,
    pub generated_at: String,
    pub framework: String,
    pub content_hash: String,
    pub routes: usize,
    pub components: usize,
    pub api_calls: usize,
    pub dependencies: usize,
    pub truncated: bool,
    pub stages: Vec<StageRow>,
    pub test_files: Vec<String>,
    /// Mermaid source of the component graph, empty when there is no graph
    pub diagram: String,
}

impl RunReport {
    pub fn new(run: &PipelineRun, context: &Context, test_files: &[PathBuf], diagram: String) -> Self {
        let stages = run
            .stages
            .iter()
            .map(|record| StageRow {
                stage: record.stage.to_string(),
                state: record.state.to_string(),
                attempts: record.attempts,
                error: record.error.clone(),
                artifact: record.state == StageState::Completed,
            })
            .collect();

        Self {
            run_id: run.run_id.clone(),
            repository: run.repository.clone(),
            generated_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            framework: context.framework.to_string(),
            content_hash: context.content_hash.clone(),
            routes: context.routes.len(),
            components: context.components.len(),
            api_calls: context.api_calls.len(),
            dependencies: context.graph.edge_count(),
            truncated: context.truncated,
            stages,
            test_files: test_files.iter().map(|p| p.display().to_string()).collect(),
            diagram,
        }
    }
}

/// Files written by one report generation
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub user_flows: Option<PathBuf>,
    pub run_report: Option<PathBuf>,
    pub graph: Option<PathBuf>,
    pub test_files: Vec<PathBuf>,
}

impl GenerationReport {
    /// Every file written
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = Vec::new();
        files.extend(self.user_flows.as_deref());
        files.extend(self.graph.as_deref());
        files.extend(self.test_files.iter().map(PathBuf::as_path));
        files.extend(self.run_report.as_deref());
        files
    }
}

/// Renders a run's artifacts to disk
pub struct ReportGenerator {
    config: OutputConfig,
    template_engine: TemplateEngine,
    diagrams: DiagramGenerator,
}

impl ReportGenerator {
    pub fn new(config: OutputConfig) -> Result<Self> {
        Ok(Self {
            diagrams: DiagramGenerator::new(config.diagram_max_nodes),
            template_engine: TemplateEngine::new()?,
            config,
        })
    }

    /// Write every report for the current state of a run.
    ///
    /// Only completed stages contribute files, so a partially failed run
    /// still produces the reports and tests that exist.
    pub async fn generate(
        &self,
        store: &dyn ArtifactStore,
        run: &PipelineRun,
        context: &Context,
    ) -> Result<GenerationReport> {
        let mut report = GenerationReport::default();
        fs::create_dir_all(&self.config.report_dir).await?;

        report.graph = Some(self.write_graph(context).await?);

        if run.state(StageName::UserFlows) == StageState::Completed {
            if let Some(artifact) = store.get(&run.run_id, StageName::UserFlows).await? {
                report.user_flows =
                    Some(self.write_user_flows(&run.repository, &artifact.text).await?);
            }
        }

        for kind in TestKind::ALL {
            let stage = StageName::Generate(kind);
            if run.state(stage) != StageState::Completed {
                continue;
            }
            if let Some(artifact) = store.get(&run.run_id, stage).await? {
                report
                    .test_files
                    .push(write_test_file(&self.config.output_dir, kind, &artifact.text).await?);
            }
        }

        let diagram = if context.graph.node_count() > 0 {
            self.diagrams.mermaid(context)
        } else {
            String::new()
        };
        let run_report = RunReport::new(run, context, &report.test_files, diagram);
        report.run_report = Some(self.write_run_report(&run_report).await?);

        info!(
            run_id = %run.run_id,
            files = report.files().len(),
            report_dir = %self.config.report_dir.display(),
            "reports written"
        );
        Ok(report)
    }

    pub async fn write_user_flows(&self, repository: &str, text: &str) -> Result<PathBuf> {
        let rendered = self
            .template_engine
            .render_user_flows(&UserFlowsReport::new(repository, text))?;
        self.write_report(USER_FLOWS_FILE, &rendered).await
    }

    pub async fn write_run_report(&self, report: &RunReport) -> Result<PathBuf> {
        let rendered = self.template_engine.render_run_report(report)?;
        self.write_report(RUN_REPORT_FILE, &rendered).await
    }

    pub async fn write_graph(&self, context: &Context) -> Result<PathBuf> {
        self.write_report(GRAPH_FILE, &self.diagrams.dot(context)).await
    }

    async fn write_report(&self, name: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.report_dir).await?;
        let path = self.config.report_dir.join(name);
        fs::write(&path, content).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::analysis::{ContextAssembler, DependencyGraph};
    use crate::extract::{Component, ExtractionReport, Route};
    use crate::pipeline::{FsArtifactStore, StageArtifact};
    use crate::scan::Framework;
    use tempfile::TempDir;

    const FLOWS: &str = "## Flow: User Login\n- **Route**: /login\n- **Components**: LoginForm\n- **Steps**:\n  1. Open /login\n  2. Click \"Sign In\"\n";

    fn context() -> Context {
        let mut report = ExtractionReport::default();
        report.routes.push(Route::new("/login", "src/App.tsx"));
        let app = Component::new("App", "src/App.tsx");
        let form = Component::new("LoginForm", "src/LoginForm.tsx");
        let mut graph = DependencyGraph::new();
        graph.add_node(app.id());
        graph.add_node(form.id());
        graph.add_edge(&app.id(), &form.id());
        report.components = vec![app, form];
        ContextAssembler::default().assemble(Framework::React, report, graph)
    }

    fn generator(dir: &TempDir) -> ReportGenerator {
        ReportGenerator::new(OutputConfig {
            output_dir: dir.path().join("tests"),
            report_dir: dir.path().join("reports/nested"),
            log_dir: None,
            state_dir: dir.path().join("state"),
            ..OutputConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_user_flows_report_rendering() {
        let dir = TempDir::new().unwrap();
        let path = generator(&dir).write_user_flows("github.com/acme/app", FLOWS).await.unwrap();
        let md = fs::read_to_string(path).unwrap();

        assert!(md.starts_with("# User Flows"));
        assert!(md.contains("- **Repository**: github.com/acme/app"));
        assert!(md.contains("- **Flows**: 1 flow"));
        assert!(md.contains("## 1. User Login"));
        assert!(md.contains("- **Slug**: `user-login`"));
        assert!(md.contains("- **Route**: `/login`"));
        assert!(md.contains("- **Components**: LoginForm"));
        assert!(md.contains("  2. Click \"Sign In\""));
        assert!(!md.contains("Unstructured response"));
    }

    #[test]
    fn test_unparsed_flows_keep_raw_text() {
        let report = UserFlowsReport::new("repo", "Just prose, no flows.");
        assert!(report.flows.is_empty());
        assert_eq!(report.raw.as_deref(), Some("Just prose, no flows."));

        let engine = TemplateEngine::new().unwrap();
        let md = engine.render_user_flows(&report).unwrap();
        assert!(md.contains("Unstructured response"));
        assert!(md.contains("- **Flows**: 0 flows"));
    }

    #[tokio::test]
    async fn test_generate_writes_completed_artifacts_only() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path().join("state"));
        let ctx = context();
        let mut run = PipelineRun::new("app-1", "/repos/app", &ctx.content_hash);

        run.set_state(StageName::Analyze, StageState::Completed);
        run.set_state(StageName::UserFlows, StageState::Completed);
        store
            .put("app-1", StageName::UserFlows, &StageArtifact::new(StageName::UserFlows, FLOWS, "h"))
            .await
            .unwrap();
        let flow = StageName::Generate(TestKind::Flow);
        run.set_state(flow, StageState::Completed);
        store
            .put("app-1", flow, &StageArtifact::new(flow, "```ts\ntest('login', async () => {});\n```", "h"))
            .await
            .unwrap();
        run.fail(StageName::Generate(TestKind::Visual), "gateway: request timed out after 120 seconds");

        let report = generator(&dir).generate(&store, &run, &ctx).await.unwrap();

        assert_eq!(report.test_files, vec![dir.path().join("tests/flow.spec.ts")]);
        assert_eq!(
            fs::read_to_string(&report.test_files[0]).unwrap(),
            "test('login', async () => {});\n"
        );
        assert!(report.user_flows.as_ref().unwrap().exists());
        assert_eq!(report.files().len(), 4);

        let dot = fs::read_to_string(report.graph.as_ref().unwrap()).unwrap();
        assert!(dot.contains("\"App (src/App.tsx)\" -> \"LoginForm (src/LoginForm.tsx)\";"));

        let summary = fs::read_to_string(report.run_report.as_ref().unwrap()).unwrap();
        assert!(summary.contains("- **Framework**: react"));
        assert!(summary.contains("| Routes | 1 |"));
        assert!(summary.contains("| Generate:flow | completed | 0 | artifact stored |"));
        assert!(summary.contains("| Generate:visual | failed | 0 | gateway: request timed out after 120 seconds |"));
        assert!(summary.contains("```mermaid"));
        assert!(summary.contains("flow.spec.ts"));
    }

    #[tokio::test]
    async fn test_generate_for_empty_run() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path().join("state"));
        let ctx = ContextAssembler::default().assemble(
            Framework::Unknown,
            ExtractionReport::default(),
            DependencyGraph::new(),
        );
        let run = PipelineRun::new("empty", "repo", &ctx.content_hash);

        let report = generator(&dir).generate(&store, &run, &ctx).await.unwrap();
        assert!(report.user_flows.is_none());
        assert!(report.test_files.is_empty());
        let summary = fs::read_to_string(report.run_report.unwrap()).unwrap();
        assert!(summary.contains("No test files were written."));
        assert!(!summary.contains("```mermaid"));
    }

    #[tokio::test]
    async fn test_generate_reports_unwritable_report_dir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("reports");
        fs::write(&blocker, "not a directory").unwrap();
        let store = FsArtifactStore::new(dir.path().join("state"));
        let ctx = context();
        let run = PipelineRun::new("app-1", "/repos/app", &ctx.content_hash);

        let result = generator(&dir).generate(&store, &run, &ctx).await;
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }

    #[tokio::test]
    async fn test_run_report_diagram_honors_node_limit() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path().join("state"));
        let ctx = context();
        let run = PipelineRun::new("app-1", "/repos/app", &ctx.content_hash);
        let generator = ReportGenerator::new(OutputConfig {
            report_dir: dir.path().join("reports"),
            output_dir: dir.path().join("tests"),
            diagram_max_nodes: 1,
            ..OutputConfig::default()
        })
        .unwrap();

        let report = generator.generate(&store, &run, &ctx).await.unwrap();
        let summary = fs::read_to_string(report.run_report.unwrap()).unwrap();
        assert!(summary.contains("```mermaid"));
        assert_eq!(summary.lines().filter(|l| l.contains("[\"")).count(), 1);
        assert!(!summary.contains("-->"));

        let dot = fs::read_to_string(report.graph.unwrap()).unwrap();
        assert!(dot.contains("LoginForm"));
    }
}
