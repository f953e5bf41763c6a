use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::Event;
use crate::core::error::ApiError;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::auth_api::{require_permission_middleware, Permission};
use crate::security::webhook::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

#[derive(Debug, Deserialize)]
struct IncomingEvent {
    name: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingBatch {
    One(IncomingEvent),
    Many(Vec<IncomingEvent>),
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `POST /api/events`: accepts one event or an array of events.
pub async fn receive_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state
        .signatures
        .validate_payload_size(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let payload = std::str::from_utf8(&body)
        .map_err(|_| ApiError::BadRequest("Body must be UTF-8 JSON".into()))?;

    match &state.config.events.signing_key {
        Some(secret) => {
            let validation = state
                .signatures
                .verify_signature(
                    payload,
                    header(&headers, SIGNATURE_HEADER),
                    header(&headers, TIMESTAMP_HEADER),
                    secret,
                )
                .await;
            if !validation.is_valid() {
                warn!("Rejected event delivery: {}", validation.error_message());
                return Err(ApiError::Unauthorized(validation.error_message().to_string()));
            }
        }
        None => warn!("EVENT_SIGNING_KEY not set, accepting unsigned event delivery"),
    }

    let batch: IncomingBatch = serde_json::from_str(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid event payload: {e}")))?;
    let incoming = match batch {
        IncomingBatch::One(event) => vec![event],
        IncomingBatch::Many(events) => events,
    };
    if incoming.is_empty() || incoming.iter().any(|e| e.name.trim().is_empty()) {
        return Err(ApiError::BadRequest("Every event needs a name".into()));
    }

    let mut ids: Vec<Uuid> = Vec::with_capacity(incoming.len());
    for event in incoming {
        let id = state
            .events
            .publish(Event::new(event.name, event.data))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        ids.push(id);
    }
    info!("Accepted {} event(s) from webhook", ids.len());

    Ok((StatusCode::ACCEPTED, Json(json!({ "ids": ids }))))
}

/// `GET /api/events`: registered functions.
pub async fn list_functions(State(state): State<Arc<AppState>>) -> Json<Value> {
    let functions = state.runtime.functions().await;
    Json(json!({ "functions": functions }))
}

/// `GET /api/events/runs`: run history, newest first.
pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Value> {
    let runs = state.runtime.runs().await;
    Json(json!({ "runs": runs }))
}

pub fn configure_event_routes() -> Router<Arc<AppState>> {
    let runs = Router::new()
        .route(ApiUrls::EVENT_RUNS, get(list_runs))
        .layer(middleware::from_fn(|req, next| {
            require_permission_middleware(Permission::ViewEventRuns, req, next)
        }));

    Router::new()
        .route(ApiUrls::EVENTS, get(list_functions).post(receive_events))
        .merge(runs)
}
