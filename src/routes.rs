use axum::{http::StatusCode, response::IntoResponse, Router};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::app_state::AppState;

/// Build the main application router
pub fn app_router() -> Router<AppState> {
    Router::new()
        .merge(crate::api::routes::system_routes::system_routes())
        .merge(crate::api::routes::event_routes::event_routes())
        // Fallback handler for 404
        .fallback(handler_404)
        // Access log: method, path, status, latency
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

// Handler for 404 Not Found
async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}
