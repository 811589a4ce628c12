//! Flowscribe - Generate Playwright tests from frontend codebases
//!
//! Scans a React, Vue, Angular or Svelte repository, extracts routes,
//! components, UI elements and API calls into a bounded context, then
//! drives a staged LLM pipeline that writes user flows and test files.
//! Every stage result is persisted so interrupted runs can resume.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod scan;

// Re-export main types
pub use analysis::{Analyzer, Context};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Orchestrator, PipelineRun, RunSummary};
