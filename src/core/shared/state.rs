use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::config::AppConfig;
use crate::email::Mailer;
use crate::events::{functions, Event, EventBus, EventRuntime, JobContext};
use crate::llm::LLMProvider;
use crate::security::auth_api::AuthConfig;
use crate::security::jwt::{JwtConfig, JwtManager};
use crate::security::password::PasswordHasher2;
use crate::security::webhook::EventSignatureVerifier;
use crate::store::Store;
use crate::triage::Triage;

/// Shared services handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub jwt: Arc<JwtManager>,
    pub passwords: Arc<PasswordHasher2>,
    pub auth_config: Arc<AuthConfig>,
    pub triage: Arc<Triage>,
    pub mailer: Arc<dyn Mailer>,
    pub events: EventBus,
    pub runtime: EventRuntime,
    pub signatures: Arc<EventSignatureVerifier>,
}

pub struct AppStateBuilder {
    config: AppConfig,
    store: Arc<dyn Store>,
    provider: Option<Arc<dyn LLMProvider>>,
    mailer: Arc<dyn Mailer>,
    passwords: Option<PasswordHasher2>,
}

impl AppStateBuilder {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            store,
            provider: None,
            mailer,
            passwords: None,
        }
    }

    pub fn provider(mut self, provider: Option<Arc<dyn LLMProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub fn passwords(mut self, passwords: PasswordHasher2) -> Self {
        self.passwords = Some(passwords);
        self
    }

    /// Builds the state and registers the job functions. The returned
    /// receiver must be handed to [`EventRuntime::start`].
    pub async fn build(self) -> anyhow::Result<(Arc<AppState>, mpsc::Receiver<Event>)> {
        let jwt = JwtManager::new(
            JwtConfig::default().with_expiry_minutes(self.config.jwt.expiry_minutes),
            &self.config.jwt.secret,
        )?;
        let passwords = match self.passwords {
            Some(passwords) => passwords,
            None => PasswordHasher2::with_defaults()?,
        };

        let triage = Arc::new(Triage::new(self.provider));
        let (events, rx) = EventBus::channel(self.config.events.queue_capacity);
        let runtime = EventRuntime::new(
            JobContext {
                store: self.store.clone(),
                triage: triage.clone(),
                mailer: self.mailer.clone(),
            },
            Duration::from_millis(self.config.events.retry_delay_ms),
        );
        functions::register_all(&runtime, self.config.events.max_retries).await;

        let state = AppState {
            config: Arc::new(self.config),
            store: self.store,
            jwt: Arc::new(jwt),
            passwords: Arc::new(passwords),
            auth_config: Arc::new(AuthConfig::default()),
            triage,
            mailer: self.mailer,
            events,
            runtime,
            signatures: Arc::new(EventSignatureVerifier::with_defaults()),
        };
        Ok((Arc::new(state), rx))
    }
}
