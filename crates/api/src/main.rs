use anyhow::Context;

use portico_api::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    portico_observability::init_with(config.log_format);

    if config.open_registration {
        tracing::warn!("PORTICO_OPEN_REGISTRATION enabled; POST user/register is public");
    }

    let app = portico_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")
}
