// Analysis: scan, detect, extract, graph and assemble a Context

pub mod context;
pub mod graph;

pub use context::{content_hash, Context, ContextAssembler, DEFAULT_BUDGET, MIN_BUDGET};
pub use graph::{resolve_import, DependencyGraph, GraphBuilder};

use crate::config::Config;
use crate::error::Result;
use crate::extract::{ExtractionWarning, Extractor};
use crate::scan::{Framework, ScanStats, Scanner, SourceFile};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Result of analyzing a repository
#[derive(Debug)]
pub struct AnalysisResult {
    pub context: Context,
    pub framework: Framework,
    pub scan_stats: ScanStats,
    /// Files no extraction rule matched
    pub warnings: Vec<ExtractionWarning>,
}

/// Runs the local half of the pipeline over a source tree
pub struct Analyzer {
    config: Config,
    verbose: bool,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            verbose: false,
        }
    }

    /// Show a scanning spinner on stderr
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Scan `root` and build its Context. Fails only when the root itself
    /// cannot be scanned.
    pub fn analyze(&self, root: &Path) -> Result<AnalysisResult> {
        let scanner = Scanner::new(self.config.scan.clone())?;
        let (files, scan_stats) = self.discover_files(&scanner, root)?;
        info!(
            root = %root.display(),
            files = scan_stats.yielded,
            skipped_large = scan_stats.skipped_large,
            skipped_unreadable = scan_stats.skipped_unreadable,
            "scan complete"
        );

        let framework = Framework::detect(&files);
        info!(framework = %framework, "detected framework");

        let extractor = Extractor::new(framework);
        let mut report = extractor.extract_all(&files);
        drop(files);
        let warnings = std::mem::take(&mut report.warnings);

        let graph = GraphBuilder::build(&report.components, &report.imports);
        let assembler = ContextAssembler::new(self.config.pipeline.context_budget);
        let context = assembler.assemble(framework, report, graph);
        info!(summary = %context.summary(), "context assembled");

        Ok(AnalysisResult {
            context,
            framework,
            scan_stats,
            warnings,
        })
    }

    fn discover_files(&self, scanner: &Scanner, root: &Path) -> Result<(Vec<SourceFile>, ScanStats)> {
        let mut walk = scanner.scan(root)?;

        let progress = if self.verbose {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {pos} files {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        } else {
            None
        };

        let mut files = Vec::new();
        for file in walk.by_ref() {
            if let Some(ref pb) = progress {
                pb.set_message(file.display_path());
                pb.inc(1);
            }
            files.push(file);
        }

        if let Some(pb) = progress {
            pb.finish_with_message("scan complete");
        }
        Ok((files, walk.stats()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("components")).unwrap();

        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"react": "^18.2.0", "react-router-dom": "^6"}}"#,
        )
        .unwrap();
        fs::write(
            src.join("App.tsx"),
            r#"
import { Routes, Route } from 'react-router-dom';
import LoginForm from './components/LoginForm';

export default function App() {
  return (
    <Routes>
      <Route path="/login" element={<LoginForm />} />
    </Routes>
  );
}
"#,
        )
        .unwrap();
        fs::write(
            src.join("components/LoginForm.tsx"),
            r#"
export default function LoginForm() {
  return <form><button type="submit">Sign In</button></form>;
}
"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
        fs::write(dir.path().join("node_modules/react/index.js"), "module.exports = {}").unwrap();
        dir
    }

    #[test]
    fn test_analyze_react_project() {
        let dir = create_test_project();
        let result = Analyzer::new(Config::default()).analyze(dir.path()).unwrap();

        assert_eq!(result.framework, Framework::React);
        assert_eq!(result.scan_stats.yielded, 3);
        assert_eq!(result.scan_stats.skipped_excluded, 1);

        let context = &result.context;
        assert_eq!(context.routes[0].path, "/login");
        assert_eq!(context.components.len(), 2);
        assert_eq!(context.graph.edge_count(), 1);
        let deps = context
            .graph
            .dependencies_of(&crate::extract::ComponentId::new("App", "src/App.tsx"));
        assert_eq!(deps[0].name, "LoginForm");
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let dir = create_test_project();
        let analyzer = Analyzer::new(Config::default());
        let a = analyzer.analyze(dir.path()).unwrap();
        let b = analyzer.analyze(dir.path()).unwrap();
        assert_eq!(a.context.content_hash, b.context.content_hash);
    }

    #[test]
    fn test_analyze_empty_directory() {
        let dir = TempDir::new().unwrap();
        let result = Analyzer::new(Config::default()).analyze(dir.path()).unwrap();
        assert!(result.context.is_empty());
        assert_eq!(result.framework, Framework::Unknown);
    }

    #[test]
    fn test_analyze_missing_root() {
        let result = Analyzer::new(Config::default()).analyze(Path::new("/no/such/repo"));
        assert!(matches!(result, Err(crate::error::Error::Scan { .. })));
    }

    #[test]
    fn test_with_verbose() {
        let analyzer = Analyzer::new(Config::default()).with_verbose(true);
        assert!(analyzer.verbose);
    }
}
