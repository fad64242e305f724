use anyhow::Context;

use haulbook_api::app::{self, services};
use haulbook_infra::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load().context("failed to load configuration")?;
    haulbook_observability::init(config.log_format);

    let (bus, notifier) = services::notification_bus(services::REALTIME_CAPACITY);
    let engine = Engine::connect(&config, std::sync::Arc::new(notifier))
        .await
        .context("failed to initialize engine")?;

    let app = app::build_app(services::AppServices::new(engine, bus));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
