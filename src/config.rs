use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub scan: ScanConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// LLM gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// Total attempts per gateway call, first try included
    pub retry_count: u32,
    pub backoff_ms: u64,
}

/// Source scanning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_file_size: u64,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
}

/// Stage scheduling and prompt bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub concurrency_limit: usize,
    /// Maximum serialized size of the context, in bytes
    pub context_budget: usize,
    pub max_prompt_chars: usize,
}

/// Artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub report_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub state_dir: PathBuf,
    /// Nodes shown in the Mermaid diagram of the run report
    pub diagram_max_nodes: usize,
}

/// LLM provider flavour spoken by the HTTP gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: "codellama:instruct".to_string(),
            api_url: None,
            api_key: None,
            timeout_seconds: 120,
            retry_count: 3,
            backoff_ms: 500,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10_000,
            extensions: ["tsx", "jsx", "ts", "js", "vue", "svelte", "html"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: vec![],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 1,
            context_budget: 48 * 1024,
            max_prompt_chars: 64 * 1024,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./tests/generated"),
            report_dir: PathBuf::from("./flowscribe-reports"),
            log_dir: None,
            state_dir: PathBuf::from("./.flowscribe"),
            diagram_max_nodes: 100,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file or return defaults
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup.
    /// `FLOWSCRIBE_*` names win over the legacy `OLLAMA_*` ones.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(model) = first(&["FLOWSCRIBE_MODEL", "OLLAMA_MODEL"]) {
            self.llm.model = model;
        }

        if let Some(url) = first(&["FLOWSCRIBE_API_URL", "OLLAMA_API_URL"]) {
            self.llm.api_url = Some(url);
        }

        if let Some(size) = first(&["FLOWSCRIBE_MAX_FILE_SIZE", "MAX_FILE_SIZE"]) {
            match size.parse() {
                Ok(bytes) => self.scan.max_file_size = bytes,
                Err(_) => tracing::warn!(value = %size, "ignoring non-numeric max file size"),
            }
        }
    }

    /// Merge CLI arguments into config (CLI takes precedence)
    pub fn merge_cli(
        &mut self,
        output: Option<PathBuf>,
        model: Option<String>,
        api_url: Option<String>,
        concurrency: Option<usize>,
        exclude: Vec<String>,
    ) {
        if let Some(out) = output {
            self.output.output_dir = out;
        }

        if let Some(m) = model {
            self.llm.model = m;
        }

        if let Some(url) = api_url {
            self.llm.api_url = Some(url);
        }

        if let Some(n) = concurrency {
            self.pipeline.concurrency_limit = n;
        }

        if !exclude.is_empty() {
            self.scan.exclude.extend(exclude);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(Error::config_validation("llm model must not be empty"));
        }

        if self.llm.retry_count == 0 {
            return Err(Error::config_validation("retry_count must be at least 1"));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(Error::config_validation("timeout_seconds must be at least 1"));
        }

        if self.pipeline.concurrency_limit == 0 {
            return Err(Error::config_validation("concurrency_limit must be at least 1"));
        }

        if self.pipeline.context_budget < 1024 {
            return Err(Error::config_validation("context_budget must be at least 1024 bytes"));
        }

        if self.pipeline.max_prompt_chars < 1024 {
            return Err(Error::config_validation("max_prompt_chars must be at least 1024"));
        }

        if self.scan.extensions.is_empty() {
            return Err(Error::config_validation("at least one scan extension required"));
        }

        if self.output.diagram_max_nodes == 0 {
            return Err(Error::config_validation("diagram_max_nodes must be at least 1"));
        }

        Ok(())
    }
}
