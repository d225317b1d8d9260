use crate::error::QuickTransError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which translation backend serves language-pair requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackendKind {
    /// Local OPUS-MT Marian models on candle
    Marian,
    /// Ollama-hosted LLM prompted to translate
    Ollama,
}

impl TranslationBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Marian => "marian",
            Self::Ollama => "ollama",
        }
    }
}

impl FromStr for TranslationBackendKind {
    type Err = QuickTransError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "marian" | "opus-mt" => Ok(Self::Marian),
            "ollama" => Ok(Self::Ollama),
            other => Err(QuickTransError::config(format!(
                "Unknown translation backend: {}",
                other
            ))),
        }
    }
}

/// QuickTrans application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Directory holding downloaded model files
    pub models_dir: PathBuf,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Whisper model name (tiny, base, small, medium, large-v3)
    pub whisper_model: String,

    /// Expected SHA-256 of the whisper weights file, checked after download
    pub whisper_model_sha256: Option<String>,

    /// Threads used by whisper inference
    pub whisper_threads: usize,

    /// Translation backend
    pub translation_backend: TranslationBackendKind,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Ollama model used for translation
    pub ollama_model: String,

    /// Maximum generated tokens per translation
    pub translation_max_length: usize,

    /// Maximum concurrent model loads + inference calls
    pub max_concurrent_jobs: usize,

    /// Upper bound on a single model acquisition
    pub model_load_timeout_secs: u64,

    /// Upper bound on a single inference call
    pub inference_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 5000,
            models_dir: PathBuf::from("./models"),
            log_dir: PathBuf::from("./log"),
            log_level: "info".to_string(),
            whisper_model: "small".to_string(),
            whisper_model_sha256: None,
            whisper_threads: 4,
            translation_backend: TranslationBackendKind::Marian,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:latest".to_string(),
            translation_max_length: 128,
            max_concurrent_jobs: 2,
            model_load_timeout_secs: 1800,
            inference_timeout_secs: 600,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, QuickTransError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();

        let translation_backend = match std::env::var("TRANSLATION_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.translation_backend,
        };

        let config = Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            models_dir: Self::get_env_path("QUICKTRANS_MODELS_DIR").unwrap_or(defaults.models_dir),
            log_dir: Self::get_env_path("LOG_DIR").unwrap_or(defaults.log_dir),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            whisper_model: std::env::var("WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            whisper_model_sha256: std::env::var("WHISPER_MODEL_SHA256").ok(),
            whisper_threads: Self::get_env_parsed("WHISPER_THREADS")
                .unwrap_or(defaults.whisper_threads),
            translation_backend,
            ollama_base_url: std::env::var("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            translation_max_length: Self::get_env_parsed("TRANSLATION_MAX_LENGTH")
                .unwrap_or(defaults.translation_max_length),
            max_concurrent_jobs: Self::get_env_parsed("MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            model_load_timeout_secs: Self::get_env_parsed("MODEL_LOAD_TIMEOUT_SECS")
                .unwrap_or(defaults.model_load_timeout_secs),
            inference_timeout_secs: Self::get_env_parsed("INFERENCE_TIMEOUT_SECS")
                .unwrap_or(defaults.inference_timeout_secs),
        };

        config.validate()?;
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    fn get_env_parsed<T: FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.parse().ok())
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), QuickTransError> {
        for dir in [&self.models_dir, &self.log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    QuickTransError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), QuickTransError> {
        if self.whisper_model.is_empty() {
            return Err(QuickTransError::config("Whisper model name cannot be empty"));
        }

        if self.server_port == 0 {
            return Err(QuickTransError::config("Server port cannot be 0"));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(QuickTransError::config(
                "Max concurrent jobs must be greater than 0",
            ));
        }

        if self.model_load_timeout_secs == 0 || self.inference_timeout_secs == 0 {
            return Err(QuickTransError::config("Timeouts must be greater than 0"));
        }

        if self.translation_max_length == 0 {
            return Err(QuickTransError::config(
                "Translation max length must be greater than 0",
            ));
        }

        if self.translation_backend == TranslationBackendKind::Ollama {
            if !self.ollama_base_url.starts_with("http://")
                && !self.ollama_base_url.starts_with("https://")
            {
                return Err(QuickTransError::config(
                    "Ollama base URL must start with http:// or https://",
                ));
            }
            if self.ollama_model.is_empty() {
                return Err(QuickTransError::config("Ollama model name cannot be empty"));
            }
        }

        Ok(())
    }
}
