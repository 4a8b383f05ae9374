use std::net::SocketAddr;

use anyhow::Context;
use llm_core::{LlmClient, LlmConfig};
use server::{build_router, config::ServerConfig, AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting Cold Bot voice relay...");

    let config = ServerConfig::from_env();
    let llm_config = LlmConfig::from_env()?;
    info!(
        "LLM provider={}, model={}, configured={}",
        llm_config.provider.name(),
        llm_config.model,
        llm_config.api_key.is_some()
    );

    let state = AppState::new(config.clone(), LlmClient::new(llm_config))?;
    state
        .store
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create {}", state.store.dir().display()))?;

    info!(
        "Server configuration loaded: port={}, voicevox={}, audio_dir={}, rate_limit={}/min",
        config.port,
        config.voicevox.base_url,
        state.store.dir().display(),
        config.rate_limit_per_minute
    );

    let app = build_router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
