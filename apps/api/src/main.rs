mod config;
mod cover_letter;
mod errors;
mod llm_client;
mod routes;
mod state;
mod uploads;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::cover_letter::generator::AssistantCoverLetterGenerator;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::uploads::UploadStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={level},tower_http={level}",
                env!("CARGO_CRATE_NAME"),
                level = &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cover Letter API v{}", env!("CARGO_PKG_VERSION"));

    // Ensure the upload directory exists
    let uploads = UploadStore::new(&config.upload_dir);
    uploads.ensure_dir().await?;
    info!("Upload directory ready at {}", uploads.dir().display());

    // Initialize LLM client
    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        Duration::from_millis(config.run_poll_interval_ms),
        Duration::from_secs(config.run_timeout_secs),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Build app state
    let state = AppState {
        config: config.clone(),
        uploads,
        generator: Arc::new(AssistantCoverLetterGenerator::new(llm)),
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
