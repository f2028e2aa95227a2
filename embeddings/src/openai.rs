//! OpenAI-compatible embedding provider.
//!
//! Works against any server exposing the `/embeddings` endpoint shape
//! (OpenAI, Azure-style proxies, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`OpenAIProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API key. Requests fail with `ProviderNotConfigured` when unset.
    pub api_key: Option<String>,

    /// API base URL, without the trailing `/embeddings`.
    pub base_url: String,

    /// Embedding model name.
    pub model: String,

    /// Requested output dimensions (if supported by the model).
    pub dimensions: Option<usize>,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    /// Create a configuration with the given API key and default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_EMBEDDING_MODEL`
    /// from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            ..Self::default()
        };
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            config.model = model;
        }
        config
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the requested output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new provider from an explicit configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// The active configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Whether an API key is configured.
    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension_hint(&self) -> Option<usize> {
        if let Some(dims) = self.config.dimensions {
            return Some(dims);
        }
        match self.config.model.as_str() {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;
        let model = &self.config.model;

        debug!("Embedding {} texts with model: {model}", texts.len());

        let mut body = serde_json::json!({
            "input": texts,
            "model": model,
        });
        if let Some(dims) = self.config.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;

        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Rows may come back in any order.
        result.data.sort_by_key(|row| row.index);
        let vectors: Vec<Embedding> = result.data.into_iter().map(|row| row.embedding).collect();

        if let Some(usage) = result.usage {
            debug!("Embedding request used {} tokens", usage.total_tokens);
        }
        info!(
            "Generated {} embeddings with model {}",
            vectors.len(),
            result.model
        );

        Ok(vectors)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f64>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}
