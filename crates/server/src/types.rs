use quicktrans_common::AUTO_DETECT;
use quicktrans_stt::{Segment, TranscriptionTask};
use quicktrans_translate::BatchItemResult;
use serde::{Deserialize, Serialize};

fn auto_detect() -> String {
    AUTO_DETECT.to_string()
}

fn default_target() -> String {
    "en".to_string()
}

/// Round seconds to two decimals for display
pub fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Service status (GET /)
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub status: String,
    pub description: String,
    pub features: Vec<String>,
}

/// Transcription request
#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Path of an audio file readable by the server
    pub audio_path: String,

    /// Language code, or "auto" to detect
    #[serde(default = "auto_detect")]
    pub language: String,

    #[serde(default)]
    pub task: TranscriptionTask,
}

/// Transcription response
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
    pub language: String,
    pub language_probability: f32,
    /// Audio duration in seconds
    pub duration: f32,
    /// Wall-clock seconds spent on the request
    pub processing_time: f64,
    pub segments: Vec<Segment>,
}

/// Batch translation response
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchTranslateResponse {
    pub total: usize,
    pub results: Vec<BatchItemResult>,
}

/// Transcribe-and-translate request
#[derive(Debug, Deserialize)]
pub struct PipelineRequest {
    pub audio_path: String,

    #[serde(default = "auto_detect")]
    pub source_lang: String,

    #[serde(default = "default_target")]
    pub target_lang: String,
}

/// Transcribe-and-translate response
#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub original_text: String,
    pub translated_text: String,
    pub detected_language: String,
    pub target_language: String,
    pub language_probability: f32,
    pub audio_duration: f32,
    pub processing_time: f64,
    pub transcription_time: f64,
    pub translation_time: f64,
}

/// One entry of the language table
#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub can_translate_to: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageInfo>,
    pub note: String,
}
