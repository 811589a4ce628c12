//! Stage scheduling, retries, persistence and resume.
//!
//! Stages form a small dependency graph. A ready-queue holds pending stages
//! whose upstream stages are all completed; a `JoinSet` runs at most
//! `concurrency_limit` of them at once. The scheduler alone mutates the
//! [`PipelineRun`]: a stage's artifact is persisted before the stage is
//! marked completed and before its dependents are enqueued.

use super::parse::validate;
use super::prompt::PromptBuilder;
use super::run::{run_id_for, PipelineRun, RunSummary, StageState};
use super::stage::{standard_stages, StageName, StageSpec};
use super::store::{ArtifactStore, StageArtifact};
use crate::analysis::Context;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{GatewayError, LlmGateway};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a stage execution did not produce an artifact
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("gateway: {0}")]
    Gateway(GatewayError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("missing upstream artifact for {0}")]
    MissingUpstream(StageName),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("cancelled")]
    Cancelled,
}

/// What a successful stage execution yields
#[derive(Debug)]
enum Produced {
    Generated(String),
    /// A stored artifact for the same context, left by an interrupted run
    Adopted,
}

#[derive(Debug)]
struct StageOutcome {
    stage: StageName,
    attempts: u32,
    result: std::result::Result<Produced, StageError>,
}

struct StageJob {
    run_id: String,
    context_hash: String,
    stage: StageName,
    context: Arc<Context>,
}

/// Executes single stages; shared by every worker task
struct StageRunner {
    gateway: Arc<dyn LlmGateway>,
    store: Arc<dyn ArtifactStore>,
    model: String,
    timeout: Duration,
    retry_count: u32,
    backoff_ms: u64,
    prompts: PromptBuilder,
    log_dir: Option<PathBuf>,
}

impl StageRunner {
    async fn execute(&self, job: StageJob, cancel: CancellationToken) -> StageOutcome {
        let mut attempts = 0;
        let result = self.produce(&job, &cancel, &mut attempts).await;
        StageOutcome {
            stage: job.stage,
            attempts,
            result,
        }
    }

    async fn produce(
        &self,
        job: &StageJob,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> std::result::Result<Produced, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        match self.store.get(&job.run_id, job.stage).await {
            Ok(Some(stored))
                if stored.context_hash == job.context_hash
                    && validate(job.stage, &stored.text).is_ok() =>
            {
                info!(stage = %job.stage, "reusing stored artifact");
                return Ok(Produced::Adopted);
            }
            Ok(_) => {}
            Err(e) => return Err(StageError::Persistence(e.to_string())),
        }

        if job.stage.is_local() {
            return serde_json::to_string_pretty(job.context.as_ref())
                .map(Produced::Generated)
                .map_err(|e| StageError::Persistence(e.to_string()));
        }

        let prompt = self.prompt_for(job).await?;
        debug!(stage = %job.stage, chars = prompt.chars().count(), "prompt built");
        self.write_transcript(&job.run_id, job.stage, "prompt.txt", &prompt)
            .await;

        let mut reason = String::new();
        for generation in 0..2 {
            if generation > 0 {
                info!(stage = %job.stage, "regenerating after invalid response");
            }
            let text = self.call_with_retry(job.stage, &prompt, cancel, attempts).await?;
            self.write_transcript(
                &job.run_id,
                job.stage,
                &format!("response.{}.txt", attempts),
                &text,
            )
            .await;
            match validate(job.stage, &text) {
                Ok(()) => return Ok(Produced::Generated(text)),
                Err(why) => {
                    warn!(stage = %job.stage, reason = %why, "response failed validation");
                    reason = why;
                }
            }
        }
        Err(StageError::Validation(reason))
    }

    async fn prompt_for(&self, job: &StageJob) -> std::result::Result<String, StageError> {
        match job.stage {
            StageName::Generate(kind) => {
                let flows = self
                    .store
                    .get(&job.run_id, StageName::UserFlows)
                    .await
                    .map_err(|e| StageError::Persistence(e.to_string()))?
                    .ok_or(StageError::MissingUpstream(StageName::UserFlows))?;
                Ok(self.prompts.generate(kind, &job.context, &flows.text))
            }
            _ => Ok(self.prompts.user_flows(&job.context)),
        }
    }

    /// One gateway call with a timeout, retried with exponential backoff
    async fn call_with_retry(
        &self,
        stage: StageName,
        prompt: &str,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> std::result::Result<String, StageError> {
        let max_tries = self.retry_count.max(1);
        let mut tries = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            tries += 1;
            *attempts += 1;
            debug!(stage = %stage, attempt = tries, gateway = self.gateway.name(), "calling gateway");

            let call = tokio::time::timeout(self.timeout, self.gateway.generate(&self.model, prompt));
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(StageError::Cancelled),
                result = call => result,
            };
            let err = match result {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout {
                    seconds: self.timeout.as_secs(),
                },
            };

            if !err.is_retryable() || tries >= max_tries {
                warn!(stage = %stage, attempts = tries, error = %err, "gateway call failed");
                return Err(StageError::Gateway(err));
            }
            let delay = backoff_delay(self.backoff_ms, tries);
            warn!(
                stage = %stage,
                attempt = tries,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "gateway call failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(StageError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn write_transcript(&self, run_id: &str, stage: StageName, suffix: &str, text: &str) {
        let Some(log_dir) = &self.log_dir else {
            return;
        };
        let dir = log_dir.join(run_id);
        let path = dir.join(format!("{}.{}", stage.slug(), suffix));
        let written = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, text).await
        };
        if let Err(e) = written.await {
            warn!(path = %path.display(), error = %e, "could not write transcript");
        }
    }
}

/// `backoff_ms * 2^(attempt-1)`
fn backoff_delay(backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(backoff_ms.saturating_mul(factor))
}

/// Drives a [`PipelineRun`] through the standard stages
pub struct Orchestrator {
    runner: Arc<StageRunner>,
    store: Arc<dyn ArtifactStore>,
    stages: Vec<StageSpec>,
    concurrency_limit: usize,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn LlmGateway>, store: Arc<dyn ArtifactStore>, config: &Config) -> Self {
        let runner = StageRunner {
            gateway,
            store: Arc::clone(&store),
            model: config.llm.model.clone(),
            timeout: Duration::from_secs(config.llm.timeout_seconds.max(1)),
            retry_count: config.llm.retry_count,
            backoff_ms: config.llm.backoff_ms,
            prompts: PromptBuilder::new(config.pipeline.max_prompt_chars),
            log_dir: config.output.log_dir.clone(),
        };
        Self {
            runner: Arc::new(runner),
            store,
            stages: standard_stages(),
            concurrency_limit: config.pipeline.concurrency_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Load or create the run for a repository.
    ///
    /// With an unchanged context hash, completed stages are kept and the rest
    /// return to pending. A changed hash or `force` resets every stage; `force`
    /// also discards stored artifacts so nothing is reused.
    pub async fn prepare_run(
        &self,
        repository: &Path,
        context_hash: &str,
        force: bool,
    ) -> Result<PipelineRun> {
        let run_id = run_id_for(repository);
        let run = match self.store.load_run(&run_id).await? {
            Some(mut run) if !force && run.context_hash == context_hash => {
                run.reset_incomplete();
                info!(
                    run_id = %run.run_id,
                    completed = run.completed().len(),
                    "resuming run with unchanged context"
                );
                run
            }
            Some(mut run) => {
                if force {
                    self.store.clear_artifacts(&run_id).await?;
                }
                info!(
                    run_id = %run.run_id,
                    forced = force,
                    "context changed or rerun forced, resetting all stages"
                );
                run.reset_all(context_hash);
                run
            }
            None => {
                info!(run_id = %run_id, "starting new run");
                PipelineRun::new(run_id, repository.display().to_string(), context_hash)
            }
        };
        self.store.save_run(&run).await?;
        Ok(run)
    }

    /// Reload a stored run and the context its Analyze stage persisted
    pub async fn resume(&self, run_id: &str) -> Result<(PipelineRun, Arc<Context>)> {
        let mut run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;
        let context = self.load_context(run_id).await?;
        run.reset_incomplete();
        self.store.save_run(&run).await?;
        Ok((run, Arc::new(context)))
    }

    /// The context stored by a run's Analyze stage
    pub async fn load_context(&self, run_id: &str) -> Result<Context> {
        let artifact = self
            .store
            .get(run_id, StageName::Analyze)
            .await?
            .ok_or_else(|| {
                Error::other(format!("run {} has no stored context; run generate first", run_id))
            })?;
        Ok(serde_json::from_str(&artifact.text)?)
    }

    /// Run every non-completed stage whose dependencies allow it.
    ///
    /// Failed stages block only their dependents. A persistence failure stops
    /// new stages from starting; cancellation returns interrupted stages to
    /// pending. Both leave the run resumable.
    pub async fn run(
        &self,
        run: &mut PipelineRun,
        context: Arc<Context>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut ready: VecDeque<StageName> = VecDeque::new();
        let mut scheduled: HashSet<StageName> = HashSet::new();
        let mut in_flight: JoinSet<StageOutcome> = JoinSet::new();
        let mut cancelled = false;
        let mut halted = false;

        info!(
            run_id = %run.run_id,
            pending = run.pending().len(),
            concurrency = self.concurrency_limit,
            "running pipeline"
        );

        loop {
            if cancel.is_cancelled() && !cancelled {
                info!(run_id = %run.run_id, "cancellation requested");
                cancelled = true;
            }

            if !cancelled && !halted {
                self.enqueue_ready(run, &mut ready, &mut scheduled);
                while in_flight.len() < self.concurrency_limit {
                    let Some(stage) = ready.pop_front() else {
                        break;
                    };
                    run.set_state(stage, StageState::Running);
                    if let Err(e) = self.store.save_run(run).await {
                        error!(stage = %stage, error = %e, "cannot persist run record, halting");
                        run.set_state(stage, StageState::Pending);
                        scheduled.remove(&stage);
                        halted = true;
                        break;
                    }
                    info!(stage = %stage, "stage started");

                    let runner = Arc::clone(&self.runner);
                    let job = StageJob {
                        run_id: run.run_id.clone(),
                        context_hash: run.context_hash.clone(),
                        stage,
                        context: Arc::clone(&context),
                    };
                    let token = cancel.clone();
                    in_flight.spawn(async move { runner.execute(job, token).await });
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(outcome) => {
                    scheduled.remove(&outcome.stage);
                    self.settle(run, outcome, &mut cancelled, &mut halted).await;
                }
                Err(e) => {
                    error!(error = %e, "stage task aborted");
                    halted = true;
                }
            }
        }

        // stages whose task died mid-flight did not finish
        let interrupted: Vec<StageName> = run
            .stages
            .iter()
            .filter(|r| r.state == StageState::Running)
            .map(|r| r.stage)
            .collect();
        if !interrupted.is_empty() {
            for stage in interrupted {
                run.set_state(stage, StageState::Pending);
            }
            if let Err(e) = self.store.save_run(run).await {
                error!(error = %e, "cannot persist run record");
            }
        }

        let summary = RunSummary::from_run(run, cancelled, halted);
        info!(
            run_id = %summary.run_id,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            pending = summary.pending.len(),
            cancelled,
            halted,
            "pipeline finished"
        );
        summary
    }

    /// Queue pending stages whose dependencies are all completed
    fn enqueue_ready(
        &self,
        run: &PipelineRun,
        ready: &mut VecDeque<StageName>,
        scheduled: &mut HashSet<StageName>,
    ) {
        for spec in &self.stages {
            if run.state(spec.name) != StageState::Pending || scheduled.contains(&spec.name) {
                continue;
            }
            let unblocked = spec
                .depends_on
                .iter()
                .all(|dep| run.state(*dep) == StageState::Completed);
            if unblocked {
                debug!(stage = %spec.name, "stage ready");
                scheduled.insert(spec.name);
                ready.push_back(spec.name);
            }
        }
    }

    /// Apply a finished stage to the run record
    async fn settle(
        &self,
        run: &mut PipelineRun,
        outcome: StageOutcome,
        cancelled: &mut bool,
        halted: &mut bool,
    ) {
        let stage = outcome.stage;
        run.set_attempts(stage, outcome.attempts);

        match outcome.result {
            Ok(Produced::Generated(text)) => {
                let artifact = StageArtifact::new(stage, text, run.context_hash.clone());
                match self.store.put(&run.run_id, stage, &artifact).await {
                    Ok(()) => {
                        run.set_state(stage, StageState::Completed);
                        info!(stage = %stage, attempts = outcome.attempts, "stage completed");
                    }
                    Err(e) => {
                        error!(stage = %stage, error = %e, "cannot persist artifact, halting");
                        run.fail(stage, StageError::Persistence(e.to_string()).to_string());
                        *halted = true;
                    }
                }
            }
            Ok(Produced::Adopted) => {
                run.set_state(stage, StageState::Completed);
                info!(stage = %stage, "stage completed from stored artifact");
            }
            Err(StageError::Cancelled) => {
                run.set_state(stage, StageState::Pending);
                *cancelled = true;
                info!(stage = %stage, "stage cancelled");
            }
            Err(e @ StageError::Persistence(_)) => {
                error!(stage = %stage, error = %e, "stage failed, halting");
                run.fail(stage, e.to_string());
                *halted = true;
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "stage failed");
                run.fail(stage, e.to_string());
            }
        }

        if let Err(e) = self.store.save_run(run).await {
            error!(stage = %stage, error = %e, "cannot persist run record, halting");
            *halted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContextAssembler, DependencyGraph};
    use crate::extract::{Component, ExtractionReport, Route};
    use crate::llm::{MockGateway, MockReply};
    use crate::pipeline::stage::TestKind;
    use crate::pipeline::store::FsArtifactStore;
    use crate::scan::Framework;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const FLOWS_KEY: &str = "describe its user flows";
    const FLOWS: &str = "## Flow: Login\n- **Route**: /login\n- **Steps**:\n  1. Click \"Sign In\"\n";

    fn test_code(name: &str) -> String {
        format!(
            "```typescript\nimport {{ test, expect }} from '@playwright/test';\ntest('{}', async ({{ page }}) => {{}});\n```",
            name
        )
    }

    fn context() -> Arc<Context> {
        let mut report = ExtractionReport::default();
        report.routes.push(Route::new("/login", "src/App.tsx"));
        report.components.push(Component::new("LoginForm", "src/LoginForm.tsx"));
        Arc::new(ContextAssembler::default().assemble(Framework::React, report, DependencyGraph::new()))
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.llm.backoff_ms = 1;
        config.llm.timeout_seconds = 5;
        config
    }

    fn script_all(gateway: &MockGateway) {
        gateway.push_for(FLOWS_KEY, MockReply::text(FLOWS));
        for kind in TestKind::ALL {
            gateway.push_for(kind.file_name(), MockReply::text(test_code(kind.as_str())));
        }
    }

    async fn setup(config: &Config) -> (TempDir, Arc<MockGateway>, Arc<FsArtifactStore>, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(FsArtifactStore::new(dir.path().join("state")));
        let orchestrator = Orchestrator::new(gateway.clone(), store.clone(), config);
        (dir, gateway, store, orchestrator)
    }

    #[tokio::test]
    async fn test_full_run_completes_every_stage() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        script_all(&gateway);
        let ctx = context();

        let mut run = orchestrator
            .prepare_run(dir.path(), &ctx.content_hash, false)
            .await
            .unwrap();
        let summary = orchestrator.run(&mut run, ctx.clone(), &CancellationToken::new()).await;

        assert!(summary.is_success(), "{:?}", summary);
        assert_eq!(summary.completed.len(), 6);
        assert_eq!(gateway.call_count(), 5);
        assert_eq!(run.latest_completed_stage(), Some(StageName::Generate(TestKind::Accessibility)));

        let stored = store.get(&run.run_id, StageName::Analyze).await.unwrap().unwrap();
        let restored: Context = serde_json::from_str(&stored.text).unwrap();
        assert_eq!(restored, *ctx);
        assert_eq!(store.load_run(&run.run_id).await.unwrap().unwrap(), run);
    }

    #[tokio::test]
    async fn test_generate_prompts_carry_user_flows() {
        let (dir, gateway, _store, orchestrator) = setup(&config()).await;
        script_all(&gateway);
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        let prompts = gateway.prompts();
        assert!(prompts[0].contains(FLOWS_KEY));
        assert!(prompts[1..].iter().all(|p| p.contains("## Flow: Login")));
    }

    #[tokio::test]
    async fn test_timeouts_then_success_within_retry_bound() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        gateway
            .push_for(FLOWS_KEY, MockReply::timeout())
            .push_for(FLOWS_KEY, MockReply::timeout())
            .push_for(FLOWS_KEY, MockReply::text(FLOWS));
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        assert_eq!(run.state(StageName::UserFlows), StageState::Completed);
        assert_eq!(run.record(StageName::UserFlows).unwrap().attempts, 3);
        let artifact = store.get(&run.run_id, StageName::UserFlows).await.unwrap().unwrap();
        assert_eq!(artifact.text, FLOWS);
    }

    #[tokio::test]
    async fn test_retries_exhausted_blocks_dependents() {
        let (dir, gateway, _store, orchestrator) = setup(&config()).await;
        for _ in 0..3 {
            gateway.push_for(FLOWS_KEY, MockReply::timeout());
        }
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        assert_eq!(gateway.calls_for(FLOWS_KEY), 3);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].1.contains("timed out"));
        assert_eq!(summary.pending.len(), 4);
        assert!(!summary.halted);
    }

    #[tokio::test]
    async fn test_invalid_response_regenerates_once() {
        let (dir, gateway, _store, orchestrator) = setup(&config()).await;
        gateway
            .push_for(FLOWS_KEY, MockReply::text("I cannot describe flows."))
            .push_for(FLOWS_KEY, MockReply::text(FLOWS));
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx.clone(), &CancellationToken::new()).await;
        assert_eq!(run.state(StageName::UserFlows), StageState::Completed);

        let (dir, gateway, _store, orchestrator) = setup(&config()).await;
        gateway
            .push_for(FLOWS_KEY, MockReply::text("nope"))
            .push_for(FLOWS_KEY, MockReply::text("still nope"));
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;
        assert_eq!(gateway.calls_for(FLOWS_KEY), 2);
        assert!(summary.failed[0].1.starts_with("validation"));
    }

    #[tokio::test]
    async fn test_empty_code_block_is_regenerated() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        let visual = StageName::Generate(TestKind::Visual);
        gateway
            .push_for(FLOWS_KEY, MockReply::text(FLOWS))
            .push_for(TestKind::Visual.file_name(), MockReply::text("```typescript\n```\n"));
        for kind in TestKind::ALL {
            gateway.push_for(kind.file_name(), MockReply::text(test_code(kind.as_str())));
        }
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        assert!(summary.is_success(), "{:?}", summary);
        assert_eq!(gateway.calls_for(&TestKind::Visual.file_name()), 2);
        let artifact = store.get(&run.run_id, visual).await.unwrap().unwrap();
        assert!(artifact.text.contains("test('visual'"));
    }

    #[tokio::test]
    async fn test_sibling_failure_is_isolated() {
        let mut config = config();
        config.pipeline.concurrency_limit = 4;
        config.llm.retry_count = 1;
        let (dir, gateway, store, orchestrator) = setup(&config).await;
        gateway.push_for(FLOWS_KEY, MockReply::text(FLOWS));
        gateway.push_for("visual.spec.ts", MockReply::timeout());
        for kind in [TestKind::Flow, TestKind::Component, TestKind::Accessibility] {
            gateway.push_for(kind.file_name(), MockReply::text(test_code(kind.as_str())));
        }

        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, StageName::Generate(TestKind::Visual));
        assert_eq!(summary.completed.len(), 5);
        assert!(store
            .get(&run.run_id, StageName::Generate(TestKind::Accessibility))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_resume_skips_completed_stages() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        gateway.push_for(FLOWS_KEY, MockReply::text(FLOWS));
        gateway.push_for("visual.spec.ts", MockReply::text("no code here"));
        gateway.push_for("visual.spec.ts", MockReply::text("still no code"));
        for kind in [TestKind::Flow, TestKind::Component, TestKind::Accessibility] {
            gateway.push_for(kind.file_name(), MockReply::text(test_code(kind.as_str())));
        }
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx.clone(), &CancellationToken::new()).await;
        assert_eq!(run.state(StageName::Generate(TestKind::Visual)), StageState::Failed);

        let second = Arc::new(MockGateway::new());
        second.push_for("visual.spec.ts", MockReply::text(test_code("visual")));
        let resumed = Orchestrator::new(second.clone(), store.clone(), &config());
        let (mut run, restored) = resumed.resume(&run.run_id).await.unwrap();
        assert_eq!(restored.content_hash, ctx.content_hash);
        let summary = resumed.run(&mut run, restored, &CancellationToken::new()).await;

        assert!(summary.is_success());
        assert_eq!(second.call_count(), 1);
        assert_eq!(second.calls_for("visual.spec.ts"), 1);
    }

    #[tokio::test]
    async fn test_changed_context_resets_and_force_discards() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        script_all(&gateway);
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx.clone(), &CancellationToken::new()).await;

        let same = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        assert!(same.is_complete());

        let changed = orchestrator.prepare_run(dir.path(), "other-hash", false).await.unwrap();
        assert!(changed.completed().is_empty());
        assert!(store.get(&run.run_id, StageName::UserFlows).await.unwrap().is_some());

        let forced = orchestrator.prepare_run(dir.path(), &ctx.content_hash, true).await.unwrap();
        assert!(forced.completed().is_empty());
        assert!(store.get(&run.run_id, StageName::UserFlows).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_artifact_is_adopted() {
        let (dir, gateway, store, orchestrator) = setup(&config()).await;
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        // artifact persisted but the run record never updated
        store
            .put(&run.run_id, StageName::UserFlows, &StageArtifact::new(StageName::UserFlows, FLOWS, &ctx.content_hash))
            .await
            .unwrap();
        for kind in TestKind::ALL {
            gateway.push_for(kind.file_name(), MockReply::text(test_code(kind.as_str())));
        }

        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;
        assert!(summary.is_success());
        assert_eq!(gateway.calls_for(FLOWS_KEY), 0);
        assert_eq!(gateway.call_count(), 4);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_stages_pending() {
        let (dir, gateway, _store, orchestrator) = setup(&config()).await;
        gateway.push_for(
            FLOWS_KEY,
            MockReply::Delayed(Duration::from_secs(30), FLOWS.to_string()),
        );
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let summary = orchestrator.run(&mut run, ctx, &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(run.state(StageName::Analyze), StageState::Completed);
        assert_eq!(run.state(StageName::UserFlows), StageState::Pending);
        assert!(summary.failed.is_empty());
    }

    /// Accepts run records but refuses artifacts
    struct ArtifactlessStore {
        inner: FsArtifactStore,
    }

    #[async_trait]
    impl ArtifactStore for ArtifactlessStore {
        async fn put(&self, _run_id: &str, _stage: StageName, _artifact: &StageArtifact) -> Result<()> {
            Err(Error::persistence(
                "/read-only/artifact.json",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }

        async fn get(&self, run_id: &str, stage: StageName) -> Result<Option<StageArtifact>> {
            self.inner.get(run_id, stage).await
        }

        async fn save_run(&self, run: &PipelineRun) -> Result<()> {
            self.inner.save_run(run).await
        }

        async fn load_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
            self.inner.load_run(run_id).await
        }

        async fn clear_artifacts(&self, run_id: &str) -> Result<()> {
            self.inner.clear_artifacts(run_id).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_halts() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(MockGateway::new());
        script_all(&gateway);
        let store = Arc::new(ArtifactlessStore {
            inner: FsArtifactStore::new(dir.path().join("state")),
        });
        let orchestrator = Orchestrator::new(gateway.clone(), store, &config());
        let ctx = context();

        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        let summary = orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        assert!(summary.halted);
        assert_ne!(run.state(StageName::Analyze), StageState::Completed);
        assert!(summary.completed.is_empty());
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_transcripts_written() {
        let mut config = config();
        let logs = TempDir::new().unwrap();
        config.output.log_dir = Some(logs.path().to_path_buf());
        let (dir, gateway, _store, orchestrator) = setup(&config).await;
        script_all(&gateway);
        let ctx = context();
        let mut run = orchestrator.prepare_run(dir.path(), &ctx.content_hash, false).await.unwrap();
        orchestrator.run(&mut run, ctx, &CancellationToken::new()).await;

        let run_logs = logs.path().join(&run.run_id);
        assert!(run_logs.join("user-flows.prompt.txt").exists());
        assert!(run_logs.join("user-flows.response.1.txt").exists());
        assert!(run_logs.join("generate-visual.prompt.txt").exists());
    }
}
