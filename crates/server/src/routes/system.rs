use actix_web::{get, web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;
use crate::types::StatusResponse;

/// Service status
#[get("/")]
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        name: "QuickTrans".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        description: "Local transcription and translation service".to_string(),
        features: vec![
            "transcription".to_string(),
            "translation".to_string(),
            "transcribe-and-translate".to_string(),
        ],
    })
}

/// Health check with model status
#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let cached: Vec<String> = state
        .translation
        .cached_pairs()
        .iter()
        .map(|pair| pair.to_string())
        .collect();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "system": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "features": {
            "transcription": true,
            "translation": true,
            "backend": state.translation.backend_name(),
        },
        "models": {
            "whisper_model": state.config.whisper_model,
            "whisper_loaded": state.transcription.is_loaded(),
            "cached_translators": cached,
        },
        "jobs": {
            "max_concurrent": state.limits.max_jobs(),
            "available": state.limits.available(),
        },
    }))
}
