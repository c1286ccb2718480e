use anyhow::Context;
use docsense::{api, config, logging, rag::RagService};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let rag = Arc::new(RagService::from_config(config));
    let app = api::create_router(api::AppState::new(rag, config));

    let address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!("Listening on http://{}", address);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
