use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog::YtDlpProvider;
use decant::api::{ApiServer, ApiServerConfig, AppState};
use decant::progress::ProgressBus;
use decant::transfer::{TransferService, TransformConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decant=debug,catalog=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let provider: Arc<dyn catalog::CatalogProvider> = Arc::new(YtDlpProvider::from_env(http_client));
    let progress_bus = Arc::new(ProgressBus::new());
    let transfer_service = Arc::new(TransferService::new(
        Arc::clone(&provider),
        Arc::clone(&progress_bus),
        TransformConfig::from_env_or_default(),
    ));

    let state = AppState::new()
        .with_catalog(provider)
        .with_progress_bus(progress_bus)
        .with_transfer_service(transfer_service);

    let server = ApiServer::with_state(ApiServerConfig::from_env_or_default(), state);
    let cancel_token = server.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            cancel_token.cancel();
        }
    });

    server.run().await?;

    Ok(())
}
