use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use brandnotify_core::AnalysisEvent;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

/// The analyzer may post one event or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum EventPayload {
    Batch(Vec<AnalysisEvent>),
    Single(AnalysisEvent),
}

impl EventPayload {
    fn into_events(self) -> Vec<AnalysisEvent> {
        match self {
            Self::Batch(events) => events,
            Self::Single(event) => vec![event],
        }
    }
}

#[derive(Debug, Serialize)]
struct QueuedData {
    queued: usize,
}

pub(super) async fn enqueue_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(payload): Json<EventPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let events = payload.into_events();

    if let Some(bad) = events.iter().find(|e| e.seq <= 0) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("seq must be positive, got {}", bad.seq),
        ));
    }

    let queued = events.len();
    for event in events {
        if state.events.send(event).await.is_err() {
            tracing::error!("event worker is gone; rejecting analysis events");
            return Err(ApiError::new(
                req_id.0,
                "unavailable",
                "event queue is closed",
            ));
        }
    }

    tracing::debug!(queued, "queued analysis events");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: QueuedData { queued },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
