use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use llm_core::LlmClient;
use server::config::ServerConfig;
use server::metrics::RelayMetrics;
use server::{app, AppState};
use tts_core::SpeechClient;

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
    info!("Starting voice relay server...");

    let config = ServerConfig::from_env();
    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY must be set in the environment")?;

    let llm = LlmClient::new(&api_key, &config.llm_model).with_api_base(&config.api_base);
    let tts = SpeechClient::new(&api_key, &config.tts_model, &config.tts_voice)
        .with_api_base(&config.api_base);

    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, llm_model={}, tts_model={}, voice={}",
        config.port, config.rate_limit_per_minute, config.llm_model, config.tts_model, config.tts_voice
    );

    let state = AppState {
        llm,
        tts,
        metrics: Arc::new(RelayMetrics::default()),
        config: config.clone(),
    };

    let router = app(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
