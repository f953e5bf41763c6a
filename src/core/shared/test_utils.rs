use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::core::config::AppConfig;
use crate::core::shared::state::{AppState, AppStateBuilder};
use crate::email::{LogMailer, MailError, Mailer, OutgoingMail};
use crate::events::{Event, JobContext};
use crate::llm::{LLMProvider, LlmError};
use crate::security::password::{Argon2Config, PasswordConfig, PasswordHasher2};
use crate::store::{MemoryStore, Store};
use crate::triage::Triage;

pub const TEST_JWT_SECRET: &str = "test-secret-key-that-is-at-least-32-characters";

pub struct MockLLMProvider {
    response: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLLMProvider {
    pub fn with_response(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().await.push(prompt.to_string());
        self.response.clone().ok_or(LlmError::Status {
            status: 404,
            body: "model not found".into(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Records every mail instead of sending it.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl CapturingMailer {
    /// Rejects the first `failures` sends with a transport error.
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().await.push(mail);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

pub fn test_config() -> AppConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("JWT_SECRET", TEST_JWT_SECRET),
        ("JOB_RETRY_DELAY_MS", "1"),
        ("LOG_DIR", "target/test-logs"),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap_or_else(|e| panic!("test config: {e}"))
}

pub fn fast_passwords() -> PasswordHasher2 {
    PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
        .unwrap_or_else(|e| panic!("password hasher: {e}"))
}

pub fn test_jobs() -> JobContext {
    test_jobs_with(
        Arc::new(MemoryStore::new()),
        Arc::new(Triage::new(None)),
        Arc::new(LogMailer),
    )
}

pub fn test_jobs_with(store: Arc<dyn Store>, triage: Arc<Triage>, mailer: Arc<dyn Mailer>) -> JobContext {
    JobContext {
        store,
        triage,
        mailer,
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<CapturingMailer>,
    pub rx: mpsc::Receiver<Event>,
}

/// In-memory state. The event receiver is returned undispatched so tests can
/// inspect emitted events or start the runtime themselves.
pub async fn test_app(provider: Option<Arc<dyn LLMProvider>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(CapturingMailer::default());
    let (state, rx) = AppStateBuilder::new(test_config(), store.clone(), mailer.clone())
        .provider(provider)
        .passwords(fast_passwords())
        .build()
        .await
        .unwrap_or_else(|e| panic!("test state: {e}"));
    TestApp {
        state,
        store,
        mailer,
        rx,
    }
}

/// Waits for the next event on the bus.
pub async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| panic!("no event emitted"))
}
