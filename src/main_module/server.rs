//! HTTP server initialization and routing

use axum::{middleware, routing::get, Router};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use crate::auth::configure_auth_routes;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::events::api::configure_event_routes;
use crate::security::auth_api::{auth_middleware, AuthMiddlewareState};
use crate::security::cors::create_cors_layer;
use crate::tickets::configure_ticket_routes;

use super::{health_check, shutdown_signal};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_state = AuthMiddlewareState::new(state.auth_config.clone(), state.jwt.clone());
    let cors = create_cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route(ApiUrls::HEALTH, get(health_check))
        .route(ApiUrls::API_HEALTH, get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_ticket_routes())
        .merge(configure_event_routes())
        .with_state(state)
        .layer(middleware::from_fn(move |req, next| {
            let state = auth_state.clone();
            async move { auth_middleware(req, next, state).await }
        }))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Periodically drops expired revoked-token ids and stale webhook signatures.
pub fn spawn_cleanup_task(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let tokens = state.jwt.cleanup_blacklist(Utc::now()).await;
            let signatures = state.signatures.cleanup_old_signatures().await;
            if tokens + signatures > 0 {
                info!("Cleanup removed {tokens} revoked token(s), {signatures} signature(s)");
            }
        }
    })
}

pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state.config.bind_address();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_app;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app(None).await;
        for uri in [ApiUrls::HEALTH, ApiUrls::API_HEALTH] {
            let response = build_router(app.state.clone())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["store"], "memory");
        }
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let app = test_app(None).await;
        for (method, uri) in [
            ("GET", ApiUrls::TICKETS),
            ("POST", ApiUrls::TICKETS),
            ("GET", ApiUrls::AUTH_USERS),
            ("POST", ApiUrls::AUTH_LOGOUT),
            ("GET", ApiUrls::EVENT_RUNS),
        ] {
            let response = build_router(app.state.clone())
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from("{}"))
                        .expect("request"),
                )
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_event_function_list_is_public() {
        let app = test_app(None).await;
        let response = build_router(app.state.clone())
            .oneshot(Request::builder().uri(ApiUrls::EVENTS).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["functions"].as_array().map(Vec::len), Some(2));
    }
}
