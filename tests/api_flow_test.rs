use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use ticketserver::core::config::AppConfig;
use ticketserver::core::shared::models::UserChanges;
use ticketserver::core::shared::state::{AppState, AppStateBuilder};
use ticketserver::email::LogMailer;
use ticketserver::llm::create_provider;
use ticketserver::main_module::build_router;
use ticketserver::security::auth_api::Role;
use ticketserver::security::password::{Argon2Config, PasswordConfig, PasswordHasher2};
use ticketserver::security::webhook::{sign_payload, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use ticketserver::store::{MemoryStore, UserStore};

const SIGNING_KEY: &str = "webhook-signing-key";
const GEMINI_PATH: &str = "/v1beta/models/gemini-1.5-flash-8b:generateContent";

struct Harness {
    router: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
}

async fn harness(gemini_url: &str) -> Harness {
    let vars: HashMap<&str, String> = HashMap::from([
        ("JWT_SECRET", "integration-secret-that-is-long-enough-to-use".to_string()),
        ("GEMINI_API_KEY", "test-key".to_string()),
        ("GEMINI_BASE_URL", gemini_url.to_string()),
        ("AI_TIMEOUT_SECONDS", "5".to_string()),
        ("JOB_RETRY_DELAY_MS", "1".to_string()),
        ("EVENT_SIGNING_KEY", SIGNING_KEY.to_string()),
    ]);
    let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("config");
    let provider = create_provider(&config.ai);
    assert!(provider.is_some());

    let store = Arc::new(MemoryStore::new());
    let passwords = PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
        .expect("hasher");
    let (state, rx) = AppStateBuilder::new(config, store.clone(), Arc::new(LogMailer))
        .provider(provider)
        .passwords(passwords)
        .build()
        .await
        .expect("state");
    state.runtime.start(rx);

    Harness {
        router: build_router(state.clone()),
        state,
        store,
    }
}

async fn call(
    h: &Harness,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = h
        .router
        .clone()
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn signup(h: &Harness, email: &str, skills: &[&str]) -> String {
    let (status, body) = call(
        h,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({"email": email, "password": "tickets-4-all", "skills": skills})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().expect("token").to_string()
}

async fn login(h: &Harness, email: &str) -> String {
    let (status, body) = call(
        h,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": email, "password": "tickets-4-all"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn test_ticket_is_triaged_and_assigned() {
    let mut gemini = mockito::Server::new_async().await;
    gemini
        .mock("POST", GEMINI_PATH)
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "candidates": [{"content": {"parts": [{"text":
                    "```json\n{\"summary\": \"Express API returns 500\", \"priority\": \"HIGH\", \"helpfulNotes\": \"Check the error middleware.\", \"relatedSkills\": [\"node.js\", \"Express\"]}\n```"
                }]}}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let h = harness(&gemini.url()).await;

    // Admin promotion happens out of band, then the admin promotes a moderator.
    signup(&h, "admin@example.com", &[]).await;
    h.store
        .update_user(
            "admin@example.com",
            UserChanges {
                role: Some(Role::Admin),
                skills: None,
            },
        )
        .await
        .expect("promote");
    let admin = login(&h, "admin@example.com").await;

    signup(&h, "mod@example.com", &["Node.js", "MongoDB"]).await;
    let (status, body) = call(
        &h,
        "POST",
        "/api/auth/update-user",
        Some(&admin),
        Some(json!({"email": "mod@example.com", "role": "moderator"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "moderator");
    let moderator = login(&h, "mod@example.com").await;

    let user = signup(&h, "user@example.com", &[]).await;
    let (status, body) = call(
        &h,
        "POST",
        "/api/tickets",
        Some(&user),
        Some(json!({"title": "API down", "description": "Express keeps returning 500"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let ticket_id = body["ticket"]["id"].as_str().expect("id").to_string();
    let ticket_uri = format!("/api/tickets/{ticket_id}");

    let mut details = Value::Null;
    for _ in 0..100 {
        let (status, body) = call(&h, "GET", &ticket_uri, Some(&moderator), None).await;
        assert_eq!(status, StatusCode::OK);
        if !body["assigned_to"].is_null() {
            details = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(details["status"], "IN_PROGRESS");
    assert_eq!(details["priority"], "high");
    assert_eq!(details["summary"], "Express API returns 500");
    assert_eq!(details["related_skills"], json!(["node.js", "Express"]));
    assert_eq!(details["assigned_to"]["email"], "mod@example.com");

    // The creator only gets the summary view.
    let (status, body) = call(&h, "GET", &ticket_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("helpful_notes").is_none());
    assert_eq!(body["status"], "IN_PROGRESS");

    let (status, body) = call(&h, "GET", "/api/events/runs", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["runs"]
        .as_array()
        .expect("runs")
        .iter()
        .any(|r| r["function_id"] == "on-ticket-created" && r["status"] == "completed"));

    let (status, _) = call(&h, "GET", "/api/events/runs", Some(&moderator), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_model_failure_uses_fallback_and_admin() {
    let mut gemini = mockito::Server::new_async().await;
    gemini
        .mock("POST", GEMINI_PATH)
        .with_status(404)
        .with_body("models/gemini-1.5-flash-8b is not found")
        .create_async()
        .await;
    let h = harness(&gemini.url()).await;

    signup(&h, "admin@example.com", &[]).await;
    h.store
        .update_user(
            "admin@example.com",
            UserChanges {
                role: Some(Role::Admin),
                skills: None,
            },
        )
        .await
        .expect("promote");
    let admin = login(&h, "admin@example.com").await;

    let user = signup(&h, "user@example.com", &[]).await;
    let (_, body) = call(
        &h,
        "POST",
        "/api/tickets",
        Some(&user),
        Some(json!({"title": "Mongo timeouts", "description": "Mongoose queries hang. Since Monday."})),
    )
    .await;
    let ticket_uri = format!("/api/tickets/{}", body["ticket"]["id"].as_str().expect("id"));

    let mut details = Value::Null;
    for _ in 0..100 {
        let (_, body) = call(&h, "GET", &ticket_uri, Some(&admin), None).await;
        if !body["triaged_at"].is_null() && !body["assigned_to"].is_null() {
            details = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(details["summary"], "Mongo timeouts");
    assert_eq!(details["priority"], "medium");
    assert_eq!(
        details["helpful_notes"],
        "Fallback analysis: Mongoose queries hang. Since Monday."
    );
    assert_eq!(details["related_skills"], json!(["MongoDB"]));
    assert_eq!(details["assigned_to"]["email"], "admin@example.com");
}

#[tokio::test]
async fn test_users_only_list_their_own_tickets() {
    let gemini = mockito::Server::new_async().await;
    let h = harness(&gemini.url()).await;

    let alice = signup(&h, "alice@example.com", &[]).await;
    let bob = signup(&h, "bob@example.com", &[]).await;
    for (token, title) in [(&alice, "Alice one"), (&alice, "Alice two"), (&bob, "Bob one")] {
        let (status, _) = call(
            &h,
            "POST",
            "/api/tickets",
            Some(token),
            Some(json!({"title": title, "description": "details"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&h, "GET", "/api/tickets", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .expect("list")
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Alice two", "Alice one"]);

    let (status, body) = call(
        &h,
        "POST",
        "/api/tickets",
        Some(&alice),
        Some(json!({"title": "", "description": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Title and description are required");

    let (status, _) = call(&h, "GET", "/api/auth/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let gemini = mockito::Server::new_async().await;
    let h = harness(&gemini.url()).await;
    let token = signup(&h, "leaver@example.com", &[]).await;

    let (status, _) = call(&h, "GET", "/api/tickets", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&h, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, _) = call(&h, "GET", "/api/tickets", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&h, "GET", "/api/tickets", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_conflict_and_login_errors() {
    let gemini = mockito::Server::new_async().await;
    let h = harness(&gemini.url()).await;
    signup(&h, "dup@example.com", &[]).await;

    let (status, body) = call(
        &h,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({"email": "DUP@example.com", "password": "tickets-4-all"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = call(
        &h,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "dup@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &h,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "ghost@example.com", "password": "tickets-4-all"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_signature_is_verified() {
    let gemini = mockito::Server::new_async().await;
    let h = harness(&gemini.url()).await;
    signup(&h, "hooked@example.com", &[]).await;

    let payload = json!({"name": "user/signup", "data": {"email": "hooked@example.com"}}).to_string();
    let timestamp = Utc::now().timestamp();
    let signature = sign_payload(&payload, SIGNING_KEY, timestamp).expect("sign");

    let post = |sig: String, body: String| {
        Request::builder()
            .method("POST")
            .uri("/api/events")
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, sig)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .body(Body::from(body))
            .expect("request")
    };

    let response = h
        .router
        .clone()
        .oneshot(post(signature.clone(), payload.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["ids"].as_array().map(Vec::len), Some(1));

    let replay = h
        .router
        .clone()
        .oneshot(post(signature, payload.clone()))
        .await
        .expect("response");
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let forged = h
        .router
        .clone()
        .oneshot(post("v1=deadbeef".into(), payload))
        .await
        .expect("response");
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    assert!(h.state.runtime.functions().await.len() >= 2);
}
