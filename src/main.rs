use tracing::{error, info};

use ticketserver::core::config::AppConfig;
use ticketserver::core::logging;
use ticketserver::main_module::{bootstrap, run_server, spawn_cleanup_task};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    let config = AppConfig::from_env()?;
    let log_path = logging::init(&config.logging.level, &config.logging.dir)?;
    info!(
        "Starting ticketserver {} (log file {}, .env {})",
        env!("CARGO_PKG_VERSION"),
        log_path.display(),
        if dotenv_loaded { "loaded" } else { "not found" }
    );

    let (state, rx) = bootstrap(config).await?;
    let dispatcher = state.runtime.start(rx);
    let cleanup = spawn_cleanup_task(state.clone());

    let result = run_server(state).await;
    cleanup.abort();
    dispatcher.abort();

    if let Err(e) = &result {
        error!("Server stopped with error: {e}");
    }
    info!("Shutdown complete");
    Ok(result?)
}
