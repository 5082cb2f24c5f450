//! # Voice Screen Backend
//!
//! HTTP service that takes an uploaded voice clip, decodes it to PCM,
//! extracts a handful of acoustic features and returns a heuristic score.
//!
//! ## Modules:
//! - **audio**: parser, transcoder, mixer, feature extraction and scoring
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **state**: shared state and request metrics
//! - **health**: liveness and metrics endpoints
//! - **middleware**: request logging and metrics collection
//! - **handlers**: upload, config and banner endpoints
//! - **error**: HTTP error responses

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod state;

use actix_web::web;

/// Register every route. Shared by the binary and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(handlers::get_config))
            .route("/config", web::put().to(handlers::update_config))
            .route("/predict", web::post().to(handlers::predict)),
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(health::health_check))
    .route("/predict", web::post().to(handlers::predict));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::App;

    #[actix_web::test]
    async fn test_routes_are_registered() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = init_service(
            App::new()
                .app_data(state.clone())
                .wrap(middleware::MetricsMiddleware)
                .wrap(middleware::RequestLogging)
                .configure(configure),
        )
        .await;

        for uri in ["/", "/api/v1/metrics", "/api/v1/config"] {
            let response = call_service(&app, TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }

        let response = call_service(&app, TestRequest::get().uri("/nope").to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 4);
        assert_eq!(metrics.error_count, 1);
        assert!(metrics.endpoint_metrics.contains_key("GET /api/v1/config"));
    }
}
