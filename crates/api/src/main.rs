use std::sync::Arc;

use anyhow::Context;

use splitledger_api::app::{self, AppServices};
use splitledger_api::config::ApiConfig;
use splitledger_api::identity::Hs256IdentityProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env().context("invalid configuration")?;
    splitledger_observability::init_with(config.log_format);
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialise ledger store")?;
    let identity = Arc::new(Hs256IdentityProvider::new(&config.jwt_secret));

    let app = app::build_app(services, identity);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
