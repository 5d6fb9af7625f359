use anyhow::Context;

use seqalign_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    seqalign_observability::init();

    let config = AppConfig::from_env();
    let (app, services) = seqalign_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    let addr = listener.local_addr()?;
    tracing::info!(
        addr = %addr,
        engine = %config.engine_submit_url(),
        "listening"
    );

    // SSE streams only end when the bus shuts down.
    let bus = services.bus.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
            bus.shutdown();
        })
        .await?;

    Ok(())
}
