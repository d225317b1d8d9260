//! QuickTrans STT (Speech-to-Text)
//!
//! Whisper.cpp based speech recognition behind a lazily loaded service

pub mod audio;
pub mod engine;
pub mod service;
pub mod types;
pub mod whisper;

// Re-export main types
pub use audio::check_audio_path;
pub use engine::{SpeechEngine, SpeechEngineLoader};
pub use service::TranscriptionService;
pub use types::{Segment, Transcription, TranscriptionOptions, TranscriptionTask};
pub use whisper::{GpuDevice, WhisperEngine, WhisperLoader};
