use actix_web::{post, web, HttpResponse};
use quicktrans_stt::TranscriptionOptions;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{round2, TranscribeRequest, TranscribeResponse};

/// Transcribe an audio file on the server's filesystem
#[post("/api/transcribe")]
pub async fn transcribe(
    req: web::Json<TranscribeRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let started = Instant::now();
    let req = req.into_inner();

    let options = TranscriptionOptions::new()
        .with_language(req.language)
        .with_task(req.task);

    let result = state.transcription.transcribe(&req.audio_path, options).await?;

    Ok(HttpResponse::Ok().json(TranscribeResponse {
        text: result.text,
        language: result.language,
        language_probability: result.language_probability,
        duration: result.duration,
        processing_time: round2(started.elapsed().as_secs_f64()),
        segments: result.segments,
    }))
}
