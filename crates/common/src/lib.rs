pub mod config;
pub mod error;
pub mod language;
pub mod lazy;
pub mod limits;
pub mod logger;
pub mod model_manager;

// Re-export commonly used types
pub use config::{AppConfig, TranslationBackendKind};
pub use error::{PipelineStage, QuickTransError};
pub use language::{Language, LanguagePair, AUTO_DETECT};
pub use lazy::LazyResource;
pub use limits::JobLimits;
pub use model_manager::{available_whisper_models, ModelManager, WhisperModel};
pub type Result<T> = std::result::Result<T, QuickTransError>;
