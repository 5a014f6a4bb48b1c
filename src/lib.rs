pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod health;
pub mod logging;
pub mod model;
pub mod server;
pub mod service;

pub use config::{CliArgs, ServerConfig, TransportKind};
pub use error::{QueryServerError, to_mcp_error};
pub use logging::{LoggingConfig, init_logging};
pub use server::SparqlQueryServer;

use anyhow::Result;
use axum::Router;
use client::HttpSparqlClient;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use service::SparqlService;
use std::sync::Arc;
use tokio::net::TcpListener;

const HTTP_SERVICE_PATH: &str = "/mcp";

/// Run the MCP SPARQL server with the given (validated) configuration.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);

    let client = HttpSparqlClient::new(&config.endpoint_url, config.request_timeout())
        .map_err(QueryServerError::from)?;
    let service = Arc::new(SparqlService::new(config.clone(), Arc::new(client))?);

    tracing::info!(
        transport = %config.transport,
        endpoint = %config.endpoint_url,
        cache_enabled = config.cache.enabled,
        cache_strategy = %config.cache.strategy,
        "starting SPARQL MCP server",
    );

    match config.transport {
        TransportKind::Stdio => {
            let server = SparqlQueryServer::from_service(service);
            server.run_stdio().await
        }
        TransportKind::Http => run_stream_http_transport(config, service).await,
    }
}

async fn run_stream_http_transport(
    config: Arc<ServerConfig>,
    service: Arc<SparqlService>,
) -> Result<()> {
    let bind_addr = config.http_bind_address;
    let mcp_service = service.clone();
    let http_service = StreamableHttpService::new(
        move || Ok(SparqlQueryServer::from_service(mcp_service.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = Router::new()
        .nest_service(HTTP_SERVICE_PATH, http_service)
        .route("/health", axum::routing::get(health::liveness_handler))
        .route("/ready", axum::routing::get(health::readiness_handler))
        .with_state(service);

    let listener = TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(transport = "http", bind = %actual_addr, path = HTTP_SERVICE_PATH, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(?error, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(anyhow::Error::from)
}
