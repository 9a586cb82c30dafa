//! Chat relay server.
//!
//! Streams Azure OpenAI completions to HTTP clients and keeps bounded
//! per-session memory.
//!
//! # Usage
//!
//! ```bash
//! AZURE_OPENAI_ENDPOINT=https://example.openai.azure.com AZURE_OPENAI_KEY=... \
//!   cargo run -p parley-web
//! cargo run -p parley-web -- --port 8080 --config relay.toml
//! ```
//!
//! Then:
//!
//! ```bash
//! curl -N localhost:8000/chat -H 'content-type: application/json' \
//!   -d '{"message": "What is a semaphore?", "session_id": "demo"}'
//! curl localhost:8000/session/demo
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use parley_rs::api::AzureOpenAiClient;
use parley_rs::chat::ChatOrchestrator;
use parley_rs::config::Settings;
use parley_rs::memory::build_memory;
use parley_web::{AppState, serve};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chat relay server with per-session memory.
#[derive(Parser)]
#[command(name = "parley-web", about = "Streaming chat relay with per-session memory")]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Config file (overrides ASSISTANT_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load(args.config.as_deref())?;
    if !settings.api_key_set() {
        warn!("Azure OpenAI key not set; upstream calls will fail until it is provided");
    }
    info!(
        "Memory {} (max {} messages, ~{} tokens per session)",
        if settings.memory.enabled { "enabled" } else { "disabled" },
        settings.memory.max_messages,
        settings.memory.max_approx_tokens
    );

    let memory = build_memory(settings.memory.enabled, settings.memory.limits());
    let source = Arc::new(AzureOpenAiClient::new(&settings.upstream)?);
    let state = AppState::new(ChatOrchestrator::new(memory, source), settings);

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    serve(listener, state, shutdown_signal()).await?;
    Ok(())
}
