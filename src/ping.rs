//! Liveness endpoint for uptime checkers.

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::{ORIGIN, USER_AGENT};
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(port: u16) -> Router {
    Router::new().route("/ping", get(ping)).with_state(port)
}

async fn ping(State(port): State<u16>, headers: HeaderMap) -> String {
    let caller = headers
        .get(ORIGIN)
        .or_else(|| headers.get(USER_AGENT))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    info!("Ping from {caller}");
    format!("Bot is alive on port: {port}")
}

/// Bind the liveness port on all interfaces.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Serve `/ping` on `listener` until the process exits.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    let port = listener.local_addr()?.port();
    info!("🌐 Liveness server listening on port {port}");
    axum::serve(listener, router(port)).await
}
