use chrono::{DateTime, Utc};
use quicktrans_common::{AppConfig, JobLimits, Result};
use quicktrans_stt::{SpeechEngineLoader, TranscriptionService, WhisperLoader};
use quicktrans_translate::{backend_from_config, TranslationBackend, TranslationManager};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Speech-to-text, loaded on first use
    pub transcription: TranscriptionService,

    /// Per-pair translator cache
    pub translation: TranslationManager,

    /// Job slots shared by both services
    pub limits: JobLimits,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state with the configured whisper model and translation backend
    pub fn new(config: AppConfig) -> Result<Self> {
        let loader = WhisperLoader::new(
            config.models_dir.clone(),
            config.whisper_model.clone(),
            config.whisper_threads,
        )?
        .with_checksum(config.whisper_model_sha256.clone());

        let backend = backend_from_config(&config)?;

        Ok(Self::with_backends(config, Arc::new(loader), backend))
    }

    /// Create state over explicit backends.
    ///
    /// Both services share one job limit, so the configured concurrency cap
    /// covers transcription and translation together.
    pub fn with_backends(
        config: AppConfig,
        speech: Arc<dyn SpeechEngineLoader>,
        translation: Arc<dyn TranslationBackend>,
    ) -> Self {
        let limits = JobLimits::from_config(&config);

        Self {
            transcription: TranscriptionService::new(speech, limits.clone()),
            translation: TranslationManager::new(translation, limits.clone()),
            limits,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Release every loaded model
    pub fn shutdown(&self) {
        info!("Releasing models...");
        self.transcription.unload();
        self.translation.release_all();
    }
}
