//! Registry notification routes (e.g., /event)

use axum::{routing::post, Router};

use crate::api::controller::event::EventController;
use crate::app_state::AppState;

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/event", post(EventController::ingest))
}
