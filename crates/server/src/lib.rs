//! QuickTrans HTTP Server
//!
//! Actix-web REST API over the transcription service and translation manager

pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod types;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use quicktrans_common::{AppConfig, Result};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Register every route plus the JSON error handler
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(error::json_config())
        .service(routes::system::index)
        .service(routes::system::health)
        .service(routes::languages::list_languages)
        .service(routes::transcribe::transcribe)
        .service(routes::translate::translate)
        .service(routes::translate::translate_batch)
        .service(routes::pipeline::transcribe_and_translate);
}

/// Run the HTTP server until it receives a shutdown signal
pub async fn start_server(config: AppConfig) -> Result<()> {
    let bind_addr = config.server_bind_address();
    let state = Arc::new(AppState::new(config)?);
    let data = web::Data::new(Arc::clone(&state));

    info!(
        "Starting HTTP server on {} (whisper={}, translation={})",
        bind_addr,
        state.config.whisper_model,
        state.translation.backend_name()
    );

    // Models load lazily on first request
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("Server stopped");
    state.shutdown();

    Ok(())
}
