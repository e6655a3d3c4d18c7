use std::sync::Arc;

use pyker_core::config::GlobalConfig;
use pyker_core::ipc::ApiServer;
use pyker_core::scripts::ScriptStore;
use pyker_core::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    tracing::info!("pyker-core daemon starting");

    let cfg = GlobalConfig::load().unwrap_or_else(|e| {
        tracing::warn!("failed to parse config, using defaults: {}", e);
        GlobalConfig::default()
    });

    let supervisor = Supervisor::new(cfg.supervisor.to_settings());
    let scripts = Arc::new(ScriptStore::new(&cfg.scripts.dir));

    // Graceful shutdown: stop every live child before exiting
    let shutdown_supervisor = supervisor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received, stopping managed processes");
        shutdown_supervisor.stop_all().await;
        tracing::info!("cleanup complete, exiting");
        std::process::exit(0);
    });

    let server = ApiServer::new(supervisor, scripts, &cfg.server.listen_addr);
    if let Err(e) = server.start().await {
        tracing::error!("API server error: {}", e);
    }

    tracing::info!("pyker-core daemon shutting down");
    Ok(())
}
