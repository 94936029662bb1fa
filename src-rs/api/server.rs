use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    handle_acquisition_types, handle_departments, handle_health, handle_query, handle_root,
    handle_stats,
};
use super::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address {0}")]
    InvalidAddress(String),

    #[error("server error: {0}")]
    Serve(String),
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/query", post(handle_query))
        .route("/api/departments", get(handle_departments))
        .route("/api/acquisition-types", get(handle_acquisition_types))
        .route("/api/stats", get(handle_stats))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Serves until ctrl-c, then runs the state's shutdown hook.
pub async fn serve(state: AppState) -> Result<(), ServerError> {
    let bind = state.settings.bind_addr();
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind.clone()))?;
    let app = build_router(state.clone());

    tracing::info!("listening on http://{}", addr);
    let result = axum::Server::try_bind(&addr)
        .map_err(|err| ServerError::Serve(err.to_string()))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(|err| ServerError::Serve(err.to_string()));

    state.shutdown();
    result
}
