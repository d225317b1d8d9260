use async_trait::async_trait;
use quicktrans_common::{ModelManager, QuickTransError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

use crate::audio::{self, WHISPER_SAMPLE_RATE};
use crate::engine::{SpeechEngine, SpeechEngineLoader};
use crate::types::{Segment, Transcription, TranscriptionOptions, TranscriptionTask};

/// GPU device type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuDevice {
    /// CUDA (NVIDIA GPU)
    Cuda,
    /// Metal (Apple GPU)
    Metal,
    /// CPU only
    Cpu,
}

impl GpuDevice {
    /// Device selected at compile time through the `cuda` / `metal` features
    pub fn detect() -> Self {
        if cfg!(feature = "cuda") {
            GpuDevice::Cuda
        } else if cfg!(feature = "metal") {
            GpuDevice::Metal
        } else {
            GpuDevice::Cpu
        }
    }
}

/// Whisper STT Engine
pub struct WhisperEngine {
    ctx: Arc<WhisperContext>,
    threads: usize,
}

impl WhisperEngine {
    /// Create a new Whisper engine from a ggml model file
    pub fn new(model_path: impl AsRef<Path>, threads: usize) -> Result<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(QuickTransError::model_load(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let path_str = path.to_str().ok_or_else(|| {
            QuickTransError::model_load(format!("Model path is not valid UTF-8: {}", path.display()))
        })?;

        let gpu_device = GpuDevice::detect();
        info!("Loading Whisper model from {} ({:?})", path.display(), gpu_device);

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| QuickTransError::model_load(format!("Failed to load Whisper model: {}", e)))?;

        info!("Whisper model loaded successfully");

        Ok(Self {
            ctx: Arc::new(ctx),
            threads: threads.max(1),
        })
    }

    /// Most probable spoken language and its probability
    fn detect_language(&self, state: &mut WhisperState, samples: &[f32]) -> Result<(String, f32)> {
        state
            .pcm_to_mel(samples, self.threads)
            .map_err(|e| QuickTransError::processing(format!("Failed to compute mel spectrogram: {}", e)))?;

        let probs = state
            .lang_detect(0, self.threads)
            .map_err(|e| QuickTransError::processing(format!("Language detection failed: {}", e)))?;

        let (id, prob) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| QuickTransError::processing("Language detection returned no candidates"))?;

        let code = whisper_rs::get_lang_str(id as i32)
            .ok_or_else(|| QuickTransError::processing(format!("Unknown language id: {}", id)))?;

        debug!("Detected language {} (p={:.3})", code, prob);
        Ok((code.to_string(), prob))
    }
}

/// whisper.cpp can split a multi-byte character across two segments; keep
/// the rest of the segment rather than dropping it
fn segment_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl SpeechEngine for WhisperEngine {
    fn transcribe(&self, audio_path: &Path, options: &TranscriptionOptions) -> Result<Transcription> {
        info!("Transcribing audio file: {}", audio_path.display());

        let audio = audio::load_audio(audio_path)?;
        let duration = audio.samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| QuickTransError::processing(format!("Failed to create Whisper state: {}", e)))?;

        let (language, language_probability) = match &options.language {
            Some(lang) => (lang.clone(), 1.0),
            None => self.detect_language(&mut state, &audio.samples)?,
        };

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language.as_str()));
        params.set_translate(options.task == TranscriptionTask::Translate);
        params.set_n_threads(self.threads as i32);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        debug!("Starting Whisper inference...");
        state
            .full(params, &audio.samples)
            .map_err(|e| QuickTransError::processing(format!("Transcription failed: {}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| QuickTransError::processing(format!("Failed to get segment count: {}", e)))?;

        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let bytes = state
                .full_get_segment_bytes(i)
                .map_err(|e| QuickTransError::processing(format!("Failed to get segment text: {}", e)))?;
            let text = segment_text(&bytes);

            let start = state
                .full_get_segment_t0(i)
                .map_err(|e| QuickTransError::processing(format!("Failed to get segment start time: {}", e)))?;
            let end = state
                .full_get_segment_t1(i)
                .map_err(|e| QuickTransError::processing(format!("Failed to get segment end time: {}", e)))?;

            // centiseconds
            segments.push(Segment::new(start as f32 / 100.0, end as f32 / 100.0, text));
        }

        let transcription =
            Transcription::from_segments(segments, language, language_probability, duration);

        info!(
            "Transcription successful: {} segments, {} characters",
            transcription.segments.len(),
            transcription.text.len()
        );

        Ok(transcription)
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

/// Loads the configured whisper model, downloading it into the models
/// directory on first use
pub struct WhisperLoader {
    manager: ModelManager,
    model: String,
    sha256: Option<String>,
    threads: usize,
}

impl WhisperLoader {
    pub fn new(models_dir: PathBuf, model: impl Into<String>, threads: usize) -> Result<Self> {
        Ok(Self {
            manager: ModelManager::new(models_dir)?,
            model: model.into(),
            sha256: None,
            threads,
        })
    }

    /// Expected SHA-256 of the downloaded weights
    pub fn with_checksum(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }
}

#[async_trait]
impl SpeechEngineLoader for WhisperLoader {
    async fn load(&self) -> Result<Arc<dyn SpeechEngine>> {
        let path = self
            .manager
            .ensure_whisper_model(&self.model, self.sha256.as_deref())
            .await?;

        let threads = self.threads;
        let engine = tokio::task::spawn_blocking(move || WhisperEngine::new(path, threads))
            .await
            .map_err(|e| QuickTransError::model_load(format!("Whisper load task failed: {}", e)))??;

        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_with_missing_model() {
        let result = WhisperEngine::new("nonexistent_model.bin", 4);
        assert!(matches!(result, Err(QuickTransError::ModelLoad(_))));
    }

    #[test]
    fn test_segment_text_keeps_split_characters() {
        assert_eq!(segment_text("你好".as_bytes()), "你好");

        // "世界" with the last character cut after its first byte
        let mut bytes = "世界".as_bytes().to_vec();
        bytes.truncate(4);
        let text = segment_text(&bytes);
        assert!(text.starts_with('世'));
        assert!(text.ends_with('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_loader_rejects_unknown_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let loader = WhisperLoader::new(dir.path().to_path_buf(), "gigantic", 4).unwrap();

        let err = loader.load().await.err().unwrap();
        assert_eq!(err.kind(), "resource_acquisition_failure");
    }
}
