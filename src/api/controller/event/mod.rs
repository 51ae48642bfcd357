//! Event controller: registry notifications in, rollout triggers out

use std::error::Error as StdError;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use http_body_util::LengthLimitError;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::dto::event_dto::DispatchSummary;
use crate::app_state::AppState;
use crate::domain::event::service::event_decoder;
use crate::domain::rollout::impact_resolver;
use crate::errors::AppError;

/// `X-Argoos-Registry-Name`, overrides the registry named in the payload
pub const REGISTRY_HEADER: &str = "x-argoos-registry-name";

/// Largest notification body accepted, 1 MiB
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub struct EventController;

impl EventController {
    pub async fn ingest(
        State(state): State<AppState>,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Json<DispatchSummary>, AppError> {
        let request_id = Uuid::new_v4();

        handle_notification(state, headers, body)
            .instrument(info_span!("registry_event", %request_id))
            .await
    }
}

async fn handle_notification(
    state: AppState,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<DispatchSummary>, AppError> {
    if let Err(e) = state.authenticator.check(&headers) {
        warn!("Rejected registry notification: {}", e);
        return Err(e.into());
    }

    if !state.controller.is_running() {
        warn!(state = ?state.controller.state(), "Rollout controller unavailable");
        return Err(AppError::ControllerUnavailable);
    }

    let raw = read_body(&headers, body).await?;

    let registry = headers.get(REGISTRY_HEADER).and_then(|v| v.to_str().ok());
    let events = event_decoder::decode(&raw, registry).map_err(|e| {
        warn!(bytes = raw.len(), "Discarding notification: {}", e);
        AppError::from(e)
    })?;

    // one snapshot for the whole batch
    let snapshot = state.controller.current_snapshot();
    let mut summary = DispatchSummary::new(events.len());

    for event in &events {
        let impacted = impact_resolver::resolve(&snapshot, event);
        if impacted.is_empty() {
            info!(image = %event, "No workload runs the pushed image");
            continue;
        }

        for workload_id in &impacted {
            summary.record(state.controller.trigger(workload_id, event));
        }
    }

    info!(
        events = summary.events,
        dispatched = summary.dispatched,
        coalesced = summary.coalesced,
        rejected = summary.rejected,
        snapshot_version = snapshot.version,
        snapshot_refreshed_at = %snapshot.refreshed_at,
        "Registry notification handled"
    );
    Ok(Json(summary))
}

async fn read_body(headers: &HeaderMap, body: Body) -> Result<axum::body::Bytes, AppError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        warn!(declared, "Notification body over limit");
        return Err(AppError::PayloadTooLarge);
    }

    axum::body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        if is_length_limit(&e) {
            warn!("Notification body over limit");
            AppError::PayloadTooLarge
        } else {
            warn!("Failed to read notification body: {}", e);
            AppError::MalformedPayload(e.to_string())
        }
    })
}

fn is_length_limit(err: &axum::Error) -> bool {
    std::iter::successors(Some(err as &(dyn StdError + 'static)), |e| (*e).source())
        .any(|e| e.is::<LengthLimitError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn length_limit_is_found_through_the_error_chain() {
        let err = axum::body::to_bytes(Body::from("{\"events\": []}"), 4)
            .await
            .unwrap_err();
        assert!(is_length_limit(&err));
    }

    #[test]
    fn other_body_errors_are_not_length_limits() {
        let err = axum::Error::new(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "reset"));
        assert!(!is_length_limit(&err));
    }

    #[tokio::test]
    async fn oversized_streamed_body_is_payload_too_large() {
        let body = Body::from(vec![b'{'; MAX_BODY_BYTES + 1]);

        let err = read_body(&HeaderMap::new(), body).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }
}
