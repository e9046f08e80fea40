use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use trovekit::{api, config::Config, LedgerReader, RpcLedgerReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    if config.branches.is_empty() {
        tracing::warn!("No collateral branches configured; hint and position routes will 404");
    }
    if config.order_book_address.is_none() {
        tracing::warn!("ORDER_BOOK_ADDRESS not set; quotes are disabled");
    }

    let ledger: Arc<dyn LedgerReader> = Arc::new(RpcLedgerReader::from_config(&config));
    let app = api::create_router(api::AppState::new(config, ledger));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
