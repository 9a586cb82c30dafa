//! HTTP front end for the parley chat relay.
//!
//! `parley-web` exposes a [`ChatOrchestrator`] over axum:
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /chat` | `{message, session_id?}` → streamed `text/plain` reply |
//! | `GET /session/{id}` | memory snapshot for one session (404 when memory is off) |
//! | `GET /config` | effective configuration, credential redacted |
//! | `GET /health` | liveness check |
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_rs::api::AzureOpenAiClient;
//! use parley_rs::chat::ChatOrchestrator;
//! use parley_rs::config::Settings;
//! use parley_rs::memory::build_memory;
//! use parley_web::{AppState, WebConfig, spawn_web};
//!
//! let settings = Settings::load(None)?;
//! let memory = build_memory(settings.memory.enabled, settings.memory.limits());
//! let source = Arc::new(AzureOpenAiClient::new(&settings.upstream)?);
//! let state = AppState::new(ChatOrchestrator::new(memory, source), settings);
//!
//! let addr = spawn_web(state, WebConfig::default()).await?;
//! println!("Relay: http://{addr}");
//! ```

mod api;
pub mod error;
mod server;

pub use api::AppState;
pub use error::ApiError;
pub use server::{build_router, serve};

use std::net::SocketAddr;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:8000`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
        }
    }
}

/// Spawn the server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down. Bind to port `0` to
/// get a random free port.
pub async fn spawn_web(state: AppState, config: WebConfig) -> std::io::Result<SocketAddr> {
    let router = build_router(state);
    server::start_server(router, config.bind_addr).await
}
