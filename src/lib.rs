pub mod api;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod models;
pub mod orders;
pub mod pipeline;
pub mod report;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::CoreState;

/// How often buffered audit entries are flushed and expired sessions pruned.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Process entry point: load configuration, prepare state, serve until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");
    let addr = config.bind_addr;

    // The blocking LLM client must be built (and dropped) outside the runtime.
    let core = Arc::new(CoreState::new(config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(Arc::clone(&core), addr))?;
    drop(runtime);

    if let Err(e) = core.flush_and_prune_audit() {
        tracing::warn!("Final audit flush failed: {e}");
    }
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}

async fn serve(core: Arc<CoreState>, addr: SocketAddr) -> anyhow::Result<()> {
    let server = api::start_api_server(Arc::clone(&core), addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    let maintenance = tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let core = Arc::clone(&core);
            match tokio::task::spawn_blocking(move || core.run_maintenance()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Maintenance failed: {e}"),
                Err(e) => tracing::error!("Maintenance task panicked: {e}"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    maintenance.abort();
    server.stop().await;
    Ok(())
}
