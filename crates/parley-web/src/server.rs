//! Axum server setup and router construction.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{self, AppState};

/// Build the full axum router.
pub fn build_router(state: AppState) -> Router {
    // Browser clients call the relay from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(api::post_chat))
        .route("/session/{session_id}", get(api::get_session))
        .route("/config", get(api::get_config))
        .route("/health", get(api::get_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a spawned task, and return the
/// bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}

/// Serve on `listener` until `shutdown` resolves, then drain open
/// connections.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
