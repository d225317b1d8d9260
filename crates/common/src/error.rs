use std::fmt;

/// Stage of the transcribe-and-translate pipeline that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Transcription,
    Translation,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Translation => "translation",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QuickTrans error types
#[derive(Debug, thiserror::Error)]
pub enum QuickTransError {
    /// Invalid request input (unknown language code, malformed value)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced resource (audio file) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No backing model routes this language pair
    #[error("Unsupported language pair: {source_lang} -> {target_lang}")]
    UnsupportedLanguagePair {
        source_lang: String,
        target_lang: String,
    },

    /// Model could not be acquired (download, disk, initialization)
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Inference failed after the model was acquired
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Failure raised inside one stage of the composite pipeline
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<QuickTransError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuickTransError {
    /// Create validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create unsupported pair error
    pub fn unsupported_pair(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguagePair {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    /// Create model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Tag an error with the pipeline stage it came from
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            // Already tagged by an inner stage, keep the innermost tag
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage tag, if this error came out of the pipeline
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, with any stage tag stripped
    pub fn root(&self) -> &QuickTransError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::Validation(_) | Self::Json(_) => "validation_error",
            Self::NotFound(_) => "resource_not_found",
            Self::UnsupportedLanguagePair { .. } => "unsupported_language_pair",
            Self::ModelLoad(_) => "resource_acquisition_failure",
            Self::Processing(_) => "processing_failure",
            Self::Config(_) => "config_error",
            Self::Io(_) | Self::Other(_) | Self::Stage { .. } => "internal_error",
        }
    }

    /// True when the caller is at fault and retrying the same request is pointless
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

// HTTP response conversion
impl QuickTransError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self.root() {
            Self::Validation(_) => 400,
            Self::UnsupportedLanguagePair { .. } => 400,
            Self::Json(_) => 400,
            Self::NotFound(_) => 404,
            Self::ModelLoad(_) => 500,
            Self::Processing(_) => 500,
            Self::Config(_) => 500,
            Self::Io(_) => 500,
            Self::Other(_) => 500,
            Self::Stage { .. } => 500,
        }
    }
}
