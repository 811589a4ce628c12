// Persistent record of one pipeline run

use super::stage::{standard_stages, StageName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Lifecycle of one stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub state: StageState,
    /// Gateway attempts made in the latest execution
    pub attempts: u32,
    /// Reason for the latest failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StageRecord {
    fn new(stage: StageName) -> Self {
        Self {
            stage,
            state: StageState::Pending,
            attempts: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Stage states of one repository's generation run.
///
/// Records are kept in declared stage order, so the cursor
/// ([`PipelineRun::latest_completed_stage`]) is the last completed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    /// Repository identifier as given by the caller
    pub repository: String,
    pub context_hash: String,
    pub stages: Vec<StageRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(
        run_id: impl Into<String>,
        repository: impl Into<String>,
        context_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            repository: repository.into(),
            context_hash: context_hash.into(),
            stages: standard_stages()
                .into_iter()
                .map(|spec| StageRecord::new(spec.name))
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record(&self, stage: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn record_mut(&mut self, stage: StageName) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|r| r.stage == stage)
    }

    /// State of a stage; stages missing from an older record count as pending
    pub fn state(&self, stage: StageName) -> StageState {
        self.record(stage).map(|r| r.state).unwrap_or_default()
    }

    pub fn set_state(&mut self, stage: StageName, state: StageState) {
        let now = Utc::now();
        match self.record_mut(stage) {
            Some(record) => {
                record.state = state;
                record.updated_at = now;
                if state != StageState::Failed {
                    record.error = None;
                }
            }
            None => {
                let mut record = StageRecord::new(stage);
                record.state = state;
                self.stages.push(record);
            }
        }
        self.updated_at = now;
    }

    /// Mark a stage failed with a reason
    pub fn fail(&mut self, stage: StageName, reason: impl Into<String>) {
        self.set_state(stage, StageState::Failed);
        if let Some(record) = self.record_mut(stage) {
            record.error = Some(reason.into());
        }
    }

    pub fn set_attempts(&mut self, stage: StageName, attempts: u32) {
        if let Some(record) = self.record_mut(stage) {
            record.attempts = attempts;
        }
    }

    /// Last completed stage in declared order
    pub fn latest_completed_stage(&self) -> Option<StageName> {
        standard_stages()
            .into_iter()
            .rev()
            .map(|spec| spec.name)
            .find(|name| self.state(*name) == StageState::Completed)
    }

    /// Reset every stage to pending, for a changed context or a forced rerun
    pub fn reset_all(&mut self, context_hash: impl Into<String>) {
        self.context_hash = context_hash.into();
        for spec in standard_stages() {
            self.set_state(spec.name, StageState::Pending);
            self.set_attempts(spec.name, 0);
        }
    }

    /// Return failed and interrupted stages to pending, keeping completed ones
    pub fn reset_incomplete(&mut self) {
        for spec in standard_stages() {
            if self.state(spec.name) != StageState::Completed {
                self.set_state(spec.name, StageState::Pending);
            }
        }
    }

    pub fn completed(&self) -> Vec<StageName> {
        self.in_state(StageState::Completed)
    }

    pub fn failed(&self) -> Vec<(StageName, String)> {
        self.stages
            .iter()
            .filter(|r| r.state == StageState::Failed)
            .map(|r| (r.stage, r.error.clone().unwrap_or_default()))
            .collect()
    }

    pub fn pending(&self) -> Vec<StageName> {
        self.in_state(StageState::Pending)
    }

    pub fn is_complete(&self) -> bool {
        standard_stages()
            .iter()
            .all(|spec| self.state(spec.name) == StageState::Completed)
    }

    fn in_state(&self, state: StageState) -> Vec<StageName> {
        self.stages
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.stage)
            .collect()
    }
}

/// Stable run id for a repository location: `<name>-<12 hex of SHA-256>`
pub fn run_id_for(repository: &Path) -> String {
    let canonical = repository
        .canonicalize()
        .unwrap_or_else(|_| repository.to_path_buf());
    let identity = canonical.to_string_lossy();
    let digest = hex::encode(Sha256::digest(identity.as_bytes()));

    let name = canonical
        .file_name()
        .map(|n| slugify(&n.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "repo".to_string());
    format!("{}-{}", name, &digest[..12])
}

/// Lowercase ASCII slug with single dashes between words
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Outcome of one orchestration call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub completed: Vec<StageName>,
    pub failed: Vec<(StageName, String)>,
    pub pending: Vec<StageName>,
    /// Stopped by the cancellation token
    pub cancelled: bool,
    /// Stopped because an artifact could not be persisted
    pub halted: bool,
}

impl RunSummary {
    pub fn from_run(run: &PipelineRun, cancelled: bool, halted: bool) -> Self {
        Self {
            run_id: run.run_id.clone(),
            completed: run.completed(),
            failed: run.failed(),
            pending: run.pending(),
            cancelled,
            halted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.pending.is_empty() && !self.cancelled && !self.halted
    }
}
