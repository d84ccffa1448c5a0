use std::sync::Arc;

use anyhow::Context;

use switchyard_api::app::{build_app, services};
use switchyard_infra::SchedulerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SchedulerConfig::load().context("failed to load configuration")?;
    switchyard_observability::init(config.log_format);

    let services = Arc::new(services::build_services(&config).await?);
    let workers = services.spawn_workers();
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", config.port))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    workers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
