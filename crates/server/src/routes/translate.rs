use actix_web::{post, web, HttpResponse};
use quicktrans_common::QuickTransError;
use quicktrans_translate::TranslationRequest;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::BatchTranslateResponse;

/// Translate one text
#[post("/api/translate")]
pub async fn translate(
    req: web::Json<TranslationRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let result = state.translation.translate_request(&req).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Translate several texts in order; the first failure fails the batch
#[post("/api/translate/batch")]
pub async fn translate_batch(
    req: web::Json<Vec<TranslationRequest>>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    if req.is_empty() {
        return Err(QuickTransError::validation("Batch must contain at least one item").into());
    }

    let results = state.translation.translate_batch(&req).await?;

    Ok(HttpResponse::Ok().json(BatchTranslateResponse {
        total: results.len(),
        results,
    }))
}
