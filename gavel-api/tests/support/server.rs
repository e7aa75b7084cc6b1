#![allow(dead_code)]

use std::net::SocketAddr;

use gavel_api::{create_router, ApiConfig, AppState};

/// Serve the full router on an ephemeral local port.
pub async fn spawn_server(state: AppState, config: &ApiConfig) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let app = create_router(state, config);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}
