use crate::api::{handlers, AppContext};
use crate::config::ServerConfig;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main router: JSON API, metrics, and the static dashboard
pub fn build_router(ctx: AppContext, server: &ServerConfig) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health_check))
        // Case records
        .route(
            "/api/casos",
            get(handlers::list_cases).post(handlers::create_case),
        )
        .route(
            "/api/casos/:data_caso",
            get(handlers::get_case).delete(handlers::delete_case),
        )
        // Model
        .route("/api/predizer", post(handlers::predict))
        .route("/api/modelo/coeficientes", get(handlers::feature_importance))
        // Prometheus
        .route("/metrics", get(handlers::metrics))
        .fallback_service(ServeDir::new(&server.static_dir))
        .with_state(ctx)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive())
}
