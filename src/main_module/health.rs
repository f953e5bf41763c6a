//! Health check handler

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::warn;

use crate::core::shared::state::AppState;
use crate::store::Store;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: store unreachable: {e}");
            false
        }
    };

    let (status, code) = if store_ok {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "ticketserver",
            "version": env!("CARGO_PKG_VERSION"),
            "store": state.store.backend_name(),
            "database": store_ok,
            "ai_provider": state.triage.provider_name(),
        })),
    )
}
