//! Staged generation: Analyze, then UserFlows, then the Generate stages.

pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod run;
pub mod stage;
pub mod store;

pub use orchestrator::{Orchestrator, StageError};
pub use parse::{first_code_block, parse_user_flows, test_source, validate, UserFlow};
pub use prompt::{context_section, PromptBuilder};
pub use run::{run_id_for, slugify, PipelineRun, RunSummary, StageRecord, StageState};
pub use stage::{standard_stages, StageName, StageSpec, TestKind};
pub use store::{ArtifactStore, FsArtifactStore, StageArtifact};
