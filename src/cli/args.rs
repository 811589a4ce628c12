//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate user flows and Playwright tests from frontend codebases
#[derive(Parser, Debug)]
#[command(name = "flowscribe")]
#[command(about = "Generate user flows and Playwright tests from frontend codebases")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Flags accepted by every command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file path (defaults to ./flowscribe.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Overrides for the pipeline configuration
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Directory for generated test files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Model name passed to the gateway
    #[arg(long)]
    pub model: Option<String>,

    /// Gateway endpoint URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Maximum stages running at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Glob patterns to exclude (can be repeated)
    #[arg(long)]
    pub exclude: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a repository and print its extracted context
    Analyze {
        /// Path to the repository
        path: PathBuf,

        /// Print the full context as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Run the full pipeline: analyze, user flows, then test generation
    Generate {
        /// Path to the repository
        path: PathBuf,

        /// Regenerate every stage even if the context is unchanged
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Continue a stored run from its persisted context
    Resume {
        /// Run id printed by `generate`
        run_id: String,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Show the stage states of a stored run
    Status {
        /// Run id printed by `generate`
        run_id: String,

        /// Print the run record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}
