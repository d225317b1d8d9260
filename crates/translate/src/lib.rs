//! QuickTrans translation
//!
//! Per-language-pair translator cache over pluggable backends: local
//! OPUS-MT models on candle, or an Ollama server.

mod backend;
mod manager;
pub mod marian;
pub mod ollama;
pub mod spm;
mod types;

pub use backend::{TranslationBackend, Translator};
pub use manager::TranslationManager;
pub use marian::MarianBackend;
pub use ollama::{OllamaBackend, OllamaClient};
pub use types::{BatchItemResult, TranslationRequest, TranslationResult};

use quicktrans_common::{AppConfig, Result, TranslationBackendKind};
use std::sync::Arc;

/// Backend selected by configuration
pub fn backend_from_config(config: &AppConfig) -> Result<Arc<dyn TranslationBackend>> {
    let backend: Arc<dyn TranslationBackend> = match config.translation_backend {
        TranslationBackendKind::Marian => Arc::new(MarianBackend::new(
            config.models_dir.clone(),
            config.translation_max_length,
        )),
        TranslationBackendKind::Ollama => Arc::new(OllamaBackend::new(
            OllamaClient::new(&config.ollama_base_url)?,
            &config.ollama_model,
        )),
    };

    Ok(backend)
}
