use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use quicktrans_common::QuickTransError;
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

/// HTTP wrapper for `QuickTransError`
#[derive(Debug)]
pub struct ApiError(pub QuickTransError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<QuickTransError> for ApiError {
    fn from(err: QuickTransError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let err = &self.0;

        if err.is_client_error() {
            warn!("Request rejected ({}): {}", err.kind(), err);
        } else {
            error!("Request failed ({}): {}", err.kind(), err);
        }

        let mut body = json!({
            "kind": err.kind(),
            "message": err.root().to_string(),
        });
        if let Some(stage) = err.stage() {
            body["stage"] = json!(stage.as_str());
        }

        HttpResponse::build(self.status_code()).json(json!({ "error": body }))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Render malformed JSON bodies in the common error shape
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req: &HttpRequest| {
        ApiError(QuickTransError::validation(format!("Invalid request body: {}", err))).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use quicktrans_common::PipelineStage;

    #[actix_web::test]
    async fn test_error_body_shape() {
        let err = ApiError(QuickTransError::unsupported_pair("zh", "ja"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "unsupported_language_pair");
        assert!(json["error"].get("stage").is_none());
    }

    #[actix_web::test]
    async fn test_stage_is_reported() {
        let err = ApiError(QuickTransError::model_load("offline").in_stage(PipelineStage::Translation));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["stage"], "translation");
        assert_eq!(json["error"]["kind"], "resource_acquisition_failure");
    }
}
