use actix_web::{post, web, HttpResponse};
use std::path::Path;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::pipeline::TranscribeTranslate;
use crate::state::AppState;
use crate::types::{round2, PipelineRequest, PipelineResponse};

/// Transcribe an audio file, then translate the transcript
#[post("/api/transcribe-and-translate")]
pub async fn transcribe_and_translate(
    req: web::Json<PipelineRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let outcome = TranscribeTranslate::new(&state)
        .process(Path::new(&req.audio_path), &req.source_lang, &req.target_lang)
        .await?;

    Ok(HttpResponse::Ok().json(PipelineResponse {
        original_text: outcome.transcription.text,
        translated_text: outcome.translated_text,
        detected_language: outcome.transcription.language,
        target_language: outcome.target.code().to_string(),
        language_probability: outcome.transcription.language_probability,
        audio_duration: outcome.transcription.duration,
        processing_time: round2(outcome.total_time.as_secs_f64()),
        transcription_time: round2(outcome.transcription_time.as_secs_f64()),
        translation_time: round2(outcome.translation_time.as_secs_f64()),
    }))
}
