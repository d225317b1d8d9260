use actix_web::{get, HttpResponse};
use quicktrans_common::Language;

use crate::types::{LanguageInfo, LanguagesResponse};

/// Supported languages and their translation targets
#[get("/api/languages")]
pub async fn list_languages() -> HttpResponse {
    let languages = Language::ALL
        .iter()
        .map(|lang| LanguageInfo {
            code: lang.code().to_string(),
            name: lang.name().to_string(),
            can_translate_to: lang.targets().iter().map(|t| t.code().to_string()).collect(),
        })
        .collect();

    HttpResponse::Ok().json(LanguagesResponse {
        languages,
        note: "English is the hub language: other languages translate to and from English".to_string(),
    })
}
