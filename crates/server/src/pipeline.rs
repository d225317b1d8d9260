//! Transcribe-then-translate pipeline
//!
//! Runs the two stages strictly in sequence. Request checks (audio path, then
//! codes) run before either stage touches a model. Failures inside a stage
//! are tagged with that stage.

use quicktrans_common::{Language, LanguagePair, PipelineStage, Result, AUTO_DETECT};
use quicktrans_stt::{check_audio_path, Transcription, TranscriptionOptions};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

use crate::state::AppState;

/// Result of a full pipeline run
#[derive(Debug)]
pub struct PipelineOutcome {
    pub transcription: Transcription,
    pub translated_text: String,
    pub target: Language,
    pub transcription_time: Duration,
    pub translation_time: Duration,
    pub total_time: Duration,
}

pub struct TranscribeTranslate<'a> {
    state: &'a AppState,
}

impl<'a> TranscribeTranslate<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn process(
        &self,
        audio_path: &Path,
        source_hint: &str,
        target_lang: &str,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();

        let audio_path = check_audio_path(audio_path)?;
        let target = Language::parse(target_lang)?;
        let mut options = TranscriptionOptions::new();
        if source_hint != AUTO_DETECT {
            options = options.with_language(Language::parse(source_hint)?.code());
        }

        info!(
            "Pipeline: {} ({} -> {})",
            audio_path.display(),
            source_hint,
            target
        );

        let stage_started = Instant::now();
        let transcription = self
            .state
            .transcription
            .transcribe(&audio_path, options)
            .await
            .map_err(|e| e.in_stage(PipelineStage::Transcription))?;
        let transcription_time = stage_started.elapsed();

        let stage_started = Instant::now();
        let pair = LanguagePair::route(&transcription.language, target.code())
            .map_err(|e| e.in_stage(PipelineStage::Translation))?;
        let translated_text = self
            .state
            .translation
            .translate_pair(&transcription.text, pair)
            .await
            .map_err(|e| e.in_stage(PipelineStage::Translation))?;
        let translation_time = stage_started.elapsed();

        let total_time = started.elapsed();
        info!(
            "Pipeline done in {:.2}s (transcription {:.2}s, translation {:.2}s)",
            total_time.as_secs_f64(),
            transcription_time.as_secs_f64(),
            translation_time.as_secs_f64()
        );

        Ok(PipelineOutcome {
            transcription,
            translated_text,
            target,
            transcription_time,
            translation_time,
            total_time,
        })
    }
}
