//! Startup wiring: store, model provider, mailer and application state.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::shared::state::{AppState, AppStateBuilder};
use crate::email::{create_mailer, Mailer};
use crate::events::Event;
use crate::llm::{create_provider, LLMProvider};
use crate::store::{MemoryStore, Store};

/// PostgreSQL when `DATABASE_URL` is set (migrations applied), memory otherwise.
pub fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
        return Ok(Arc::new(MemoryStore::new()));
    };
    open_postgres(url, config.database.pool_size)
}

#[cfg(feature = "postgres")]
fn open_postgres(url: &str, pool_size: u32) -> anyhow::Result<Arc<dyn Store>> {
    use crate::core::shared::utils::{create_conn, redact_database_url, run_migrations};
    use crate::store::PgStore;

    info!("Connecting to {}", redact_database_url(url));
    let pool = create_conn(url, pool_size)
        .map_err(|e| anyhow::anyhow!("Failed to create database pool: {e}"))?;
    let applied = run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Database ready ({applied} migration(s) applied)");
    Ok(Arc::new(PgStore::new(pool)))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_url: &str, _pool_size: u32) -> anyhow::Result<Arc<dyn Store>> {
    anyhow::bail!("DATABASE_URL is set but this build has no postgres feature")
}

pub async fn bootstrap(config: AppConfig) -> anyhow::Result<(Arc<AppState>, mpsc::Receiver<Event>)> {
    let store = open_store(&config)?;
    let provider = create_provider(&config.ai);
    let mailer = create_mailer(config.email.as_ref());
    info!(
        "Store={} mailer={} ai={}",
        store.backend_name(),
        mailer.name(),
        provider.as_ref().map(|p| p.name()).unwrap_or("fallback-only")
    );

    AppStateBuilder::new(config, store, mailer)
        .provider(provider)
        .build()
        .await
}
