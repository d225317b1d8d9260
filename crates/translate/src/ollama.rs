//! Ollama-backed translation
//!
//! Sends a translation prompt to a local Ollama server. Useful when no
//! OPUS-MT weights are available offline.

use async_trait::async_trait;
use quicktrans_common::{LanguagePair, QuickTransError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{TranslationBackend, Translator};

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,

    pub prompt: String,

    /// Disable streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

/// Generation options
#[derive(Debug, Clone, Serialize, Default)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// Ollama generate response
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,

    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| QuickTransError::model_load(format!("Failed to create HTTP client: {}", e)))?;

        info!("Ollama client initialized: {}", base_url);
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text with a single request; callers decide whether to retry
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        debug!(
            "Sending generate request to Ollama - Model: {}, Prompt length: {}",
            request.model,
            request.prompt.len()
        );

        self.try_generate(&url, request).await.map_err(|e| {
            warn!("Ollama request failed: {}", e);
            e
        })
    }

    async fn try_generate(&self, url: &str, request: &GenerateRequest) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| QuickTransError::processing(format!("Failed to send request: {}", e)))?
            .error_for_status()
            .map_err(|e| QuickTransError::processing(format!("Ollama API error: {}", e)))?;

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| QuickTransError::processing(format!("Failed to parse response: {}", e)))?;

        if result.response.trim().is_empty() {
            return Err(QuickTransError::processing("Empty response from Ollama"));
        }

        Ok(result.response)
    }

    /// Names of the models installed on the server
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| QuickTransError::model_load(format!("Failed to connect to Ollama: {}", e)))?
            .error_for_status()
            .map_err(|e| QuickTransError::model_load(format!("Ollama API error: {}", e)))?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| QuickTransError::model_load(format!("Failed to parse model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Prompt asking the model for a bare translation
pub fn translation_prompt(pair: LanguagePair, text: &str) -> String {
    format!(
        "Translate the following {} text into {}. Reply with the translation only, \
         without quotes, notes or explanations.\n\n{}",
        pair.source.name(),
        pair.target.name(),
        text
    )
}

pub struct OllamaBackend {
    client: OllamaClient,
    model: String,
}

impl OllamaBackend {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    async fn acquire(&self, pair: LanguagePair) -> Result<Arc<dyn Translator>> {
        let models = self.client.list_models().await?;

        // "llama3.2" matches "llama3.2:latest"
        let installed = models
            .iter()
            .any(|m| m == &self.model || m.split(':').next() == Some(self.model.as_str()));
        if !installed {
            return Err(QuickTransError::model_load(format!(
                "Ollama model '{}' is not installed at {}",
                self.model,
                self.client.base_url()
            )));
        }

        Ok(Arc::new(OllamaTranslator {
            client: self.client.clone(),
            model: self.model.clone(),
            pair,
        }))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

pub struct OllamaTranslator {
    client: OllamaClient,
    model: String,
    pair: LanguagePair,
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: translation_prompt(self.pair, text),
            stream: Some(false),
            options: Some(GenerateOptions {
                temperature: Some(0.0),
                num_predict: None,
            }),
        };

        let response = self.client.generate(&request).await?;
        Ok(response.trim().to_string())
    }

    fn pair(&self) -> LanguagePair {
        self.pair
    }
}
