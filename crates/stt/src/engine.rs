use async_trait::async_trait;
use quicktrans_common::Result;
use std::path::Path;
use std::sync::Arc;

use crate::types::{Transcription, TranscriptionOptions};

/// A loaded speech-to-text model.
///
/// `transcribe` is blocking and is always called from the blocking pool.
/// Implementations must tolerate concurrent calls on a shared instance.
pub trait SpeechEngine: Send + Sync {
    fn transcribe(&self, audio_path: &Path, options: &TranscriptionOptions) -> Result<Transcription>;

    /// Short engine name for logs and health output
    fn name(&self) -> &str;
}

/// Acquires a speech engine (download weights, build context).
///
/// Called at most once per load cycle of `TranscriptionService`.
#[async_trait]
pub trait SpeechEngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn SpeechEngine>>;
}
