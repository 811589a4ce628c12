use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a gateway call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Timeouts, transport failures and server-side statuses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout { .. } | GatewayError::Transport(_) => true,
            GatewayError::Status { code, .. } => *code >= 500 || *code == 429,
            GatewayError::InvalidResponse(_) => false,
        }
    }
}

/// Request/response access to a language model
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GatewayError>;

    fn name(&self) -> &str;
}
