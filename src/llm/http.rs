//! HTTP gateway for Ollama and OpenAI-compatible servers.

use super::gateway::{GatewayError, LlmGateway};
use crate::config::{LlmConfig, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Response from OpenAI API
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: String,
}

/// Request to OpenAI API
#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIRequestMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAIRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Gateway that talks to a model server over HTTP
pub struct HttpGateway {
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway from the LLM configuration
    pub fn new(config: &LlmConfig) -> Result<Self, GatewayError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let default_url = match config.provider {
            LlmProvider::Ollama => DEFAULT_OLLAMA_URL,
            LlmProvider::OpenAI => DEFAULT_OPENAI_URL,
        };
        let endpoint = config
            .api_url
            .clone()
            .unwrap_or_else(|| default_url.to_string());

        Ok(Self {
            provider: config.provider,
            endpoint,
            api_key: config.api_key.clone(),
            timeout,
            client,
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            GatewayError::Transport(err.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            code: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn query_ollama(&self, model: &str, prompt: &str) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.7,
                "top_p": 0.9,
                "top_k": 40
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Ollama: {}", e)))?;

        Ok(result.response)
    }

    async fn query_openai(&self, model: &str, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| GatewayError::InvalidResponse("OpenAI API key not configured".into()))?;

        let request = OpenAIRequest {
            model,
            messages: vec![OpenAIRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("OpenAI: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::InvalidResponse("no choices in OpenAI response".into()))
    }
}

#[async_trait]
impl LlmGateway for HttpGateway {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GatewayError> {
        debug!(endpoint = %self.endpoint, model, chars = prompt.len(), "sending prompt");
        match self.provider {
            LlmProvider::Ollama => self.query_ollama(model, prompt).await,
            LlmProvider::OpenAI => self.query_openai(model, prompt).await,
        }
    }

    fn name(&self) -> &str {
        match self.provider {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAI => "openai",
        }
    }
}
