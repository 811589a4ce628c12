//! CLI module for Flowscribe

mod args;

pub use args::{Args, Command, GlobalArgs, PipelineArgs};

use crate::analysis::{AnalysisResult, Analyzer, Context};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{HttpGateway, LlmGateway};
use crate::logging::{init_logging, LoggingConfig};
use crate::output::{GenerationReport, ReportGenerator};
use crate::pipeline::{
    ArtifactStore, FsArtifactStore, Orchestrator, PipelineRun, RunSummary, StageState,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "flowscribe.toml";

/// Run the CLI application
pub async fn run() -> ExitCode {
    let args = Args::parse_args();
    init_logging(
        LoggingConfig::from_flags(
            args.global.log_level.as_deref(),
            args.global.verbose,
            args.global.quiet,
        )
        .json(args.global.log_json),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, waiting for running stages to stop...");
            interrupt.cancel();
        }
    });

    match execute(args, cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(args: Args, cancel: CancellationToken) -> Result<ExitCode> {
    let global = args.global;
    match args.command {
        Command::Analyze {
            path,
            json,
            options,
        } => {
            let cfg = load_config(&global, &options)?;
            if !json {
                println!("Analyzing: {}", path.display());
            }
            let analysis = analyze(cfg, &path, global.verbose && !json).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis.context)?);
            } else {
                print_analysis(&analysis);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Generate {
            path,
            force,
            options,
        } => {
            let cfg = load_config(&global, &options)?;
            if global.verbose {
                println!("Repository: {}", path.display());
                println!("Model: {}", cfg.llm.model);
                println!("Concurrency: {}", cfg.pipeline.concurrency_limit);
                println!("Output: {}", cfg.output.output_dir.display());
                println!("Reports: {}", cfg.output.report_dir.display());
            }
            let gateway: Arc<dyn LlmGateway> = Arc::new(HttpGateway::new(&cfg.llm)?);
            let (summary, report) =
                generate_tests(&cfg, gateway, &path, force, global.verbose, &cancel).await?;
            print_run(&summary, &report);
            Ok(exit_code(&summary))
        }

        Command::Resume { run_id, options } => {
            let cfg = load_config(&global, &options)?;
            let gateway: Arc<dyn LlmGateway> = Arc::new(HttpGateway::new(&cfg.llm)?);
            let (summary, report) = resume_run(&cfg, gateway, &run_id, &cancel).await?;
            print_run(&summary, &report);
            Ok(exit_code(&summary))
        }

        Command::Status { run_id, json } => {
            let cfg = load_config(&global, &PipelineArgs::default())?;
            let store = FsArtifactStore::new(&cfg.output.state_dir);
            let run = store
                .load_run(&run_id)
                .await?
                .ok_or_else(|| Error::RunNotFound(run_id.clone()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_status(&run);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Version => {
            println!("flowscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Config from file, environment and flags, in increasing precedence
pub fn load_config(global: &GlobalArgs, options: &PipelineArgs) -> Result<Config> {
    let mut cfg = match &global.config {
        Some(path) => Config::load(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Config::load(default_path)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_env();
    cfg.merge_cli(
        options.output.clone(),
        options.model.clone(),
        options.api_url.clone(),
        options.concurrency,
        options.exclude.clone(),
    );
    cfg.validate()?;
    debug!(?cfg, "configuration loaded");
    Ok(cfg)
}

/// Analyze off the async runtime; extraction is CPU bound
async fn analyze(cfg: Config, path: &Path, verbose: bool) -> Result<AnalysisResult> {
    let root: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || Analyzer::new(cfg).with_verbose(verbose).analyze(&root))
        .await
        .map_err(|e| Error::other(format!("analysis task failed: {}", e)))?
}

/// Analyze a repository, run every pending stage and write the reports
pub async fn generate_tests(
    cfg: &Config,
    gateway: Arc<dyn LlmGateway>,
    repository: &Path,
    force: bool,
    verbose: bool,
    cancel: &CancellationToken,
) -> Result<(RunSummary, GenerationReport)> {
    println!("Analyzing: {}", repository.display());
    let analysis = analyze(cfg.clone(), repository, verbose).await?;
    println!("Context: {}", analysis.context.summary());

    let store = Arc::new(FsArtifactStore::new(&cfg.output.state_dir));
    let orchestrator = Orchestrator::new(gateway, store.clone(), cfg);
    let context = Arc::new(analysis.context);

    let mut run = orchestrator
        .prepare_run(repository, &context.content_hash, force)
        .await?;
    println!("Run: {}", run.run_id);
    if !force && !run.completed().is_empty() {
        println!(
            "Context unchanged, skipping {} completed stage(s)",
            run.completed().len()
        );
    }

    let summary = orchestrator.run(&mut run, context.clone(), cancel).await;
    let report = publish(cfg, store.as_ref(), &run, &context).await?;
    Ok((summary, report))
}

/// Continue a stored run from its persisted context
pub async fn resume_run(
    cfg: &Config,
    gateway: Arc<dyn LlmGateway>,
    run_id: &str,
    cancel: &CancellationToken,
) -> Result<(RunSummary, GenerationReport)> {
    let store = Arc::new(FsArtifactStore::new(&cfg.output.state_dir));
    let orchestrator = Orchestrator::new(gateway, store.clone(), cfg);
    let (mut run, context) = orchestrator.resume(run_id).await?;
    println!(
        "Resuming {}: {} stage(s) already completed",
        run.run_id,
        run.completed().len()
    );

    let summary = orchestrator.run(&mut run, context.clone(), cancel).await;
    let report = publish(cfg, store.as_ref(), &run, &context).await?;
    Ok((summary, report))
}

async fn publish(
    cfg: &Config,
    store: &dyn ArtifactStore,
    run: &PipelineRun,
    context: &Context,
) -> Result<GenerationReport> {
    let generator = ReportGenerator::new(cfg.output.clone())?;
    generator.generate(store, run, context).await
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_analysis(analysis: &AnalysisResult) {
    let context = &analysis.context;
    println!(
        "Scanned {} files ({} too large, {} unreadable, {} excluded)",
        analysis.scan_stats.yielded,
        analysis.scan_stats.skipped_large,
        analysis.scan_stats.skipped_unreadable,
        analysis.scan_stats.skipped_excluded
    );
    println!("Framework: {}", analysis.framework);
    println!("Routes: {}", context.routes.len());
    for route in context.routes.iter().take(10) {
        let guard = if route.guarded { " (guarded)" } else { "" };
        println!("  {}{}", route.path, guard);
    }
    if context.routes.len() > 10 {
        println!("  ... and {} more", context.routes.len() - 10);
    }
    println!("Components: {}", context.components.len());
    println!("API calls: {}", context.api_calls.len());
    println!("Dependencies: {}", context.graph.edge_count());
    if context.truncated {
        println!("Context truncated to fit the size budget");
    }
    println!("Context hash: {}", context.content_hash);

    if !analysis.warnings.is_empty() {
        println!("\nFiles without facts ({}):", analysis.warnings.len());
        for warning in analysis.warnings.iter().take(5) {
            println!("  {}: {}", warning.path, warning.reason);
        }
        if analysis.warnings.len() > 5 {
            println!("  ... and {} more", analysis.warnings.len() - 5);
        }
    }
}

fn print_run(summary: &RunSummary, report: &GenerationReport) {
    println!(
        "\nRun {}: {} completed, {} failed, {} pending",
        summary.run_id,
        summary.completed.len(),
        summary.failed.len(),
        summary.pending.len()
    );
    for (stage, reason) in &summary.failed {
        println!("  {} failed: {}", stage, reason);
    }
    if summary.cancelled {
        println!("Run cancelled. Continue with: flowscribe resume {}", summary.run_id);
    } else if summary.halted {
        println!(
            "Run halted: artifacts could not be stored. Continue with: flowscribe resume {}",
            summary.run_id
        );
    }
    for file in report.files() {
        println!("  wrote {}", file.display());
    }
}

fn print_status(run: &PipelineRun) {
    println!("Run: {}", run.run_id);
    println!("Repository: {}", run.repository);
    println!("Context hash: {}", run.context_hash);
    println!("Updated: {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for record in &run.stages {
        let detail = match (&record.state, &record.error) {
            (StageState::Failed, Some(error)) => format!(" - {}", error),
            _ if record.attempts > 0 => format!(" ({} attempts)", record.attempts),
            _ => String::new(),
        };
        println!("  {:<24} {:<10}{}", record.stage.to_string(), record.state.as_str(), detail);
    }
    match run.latest_completed_stage() {
        Some(stage) => println!("Latest completed stage: {}", stage),
        None => println!("No stage completed yet"),
    }
}
