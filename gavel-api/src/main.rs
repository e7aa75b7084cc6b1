//! Gavel API Server Entry Point
//!
//! Bootstraps configuration, prepares the schema, connects to Redis and
//! starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use gavel_api::telemetry::{init_tracing, TelemetryConfig};
use gavel_api::{
    create_router, ApiConfig, ApiError, ApiResult, DbClient, DbConfig, GavelRuntime, RedisConfig,
    RedisStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.ensure_schema().await?;

    let redis = Arc::new(RedisStore::connect(&RedisConfig::from_env()).await?);

    let api_config = ApiConfig::from_env();
    let runtime = GavelRuntime::start(&api_config, redis.clone(), redis, Arc::new(db));
    let app = create_router(runtime.state(), &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Gavel API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("GAVEL_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("GAVEL_API_PORT").ok())
        .unwrap_or_else(|| "8000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
