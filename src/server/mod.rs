//! HTTP scan server
//!
//! Exposes file scans and the Kubernetes validating admission webhook over
//! HTTP.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syncable_iac_scan::config::ScanConfig;
//! use syncable_iac_scan::server::{ScanServer, ServerConfig};
//!
//! # async fn run() -> std::io::Result<()> {
//! let server = ScanServer::new(ServerConfig::new().port(9010), Arc::new(ScanConfig::default()));
//! server.run().await
//! # }
//! ```

pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use log::info;
use tower_http::cors::CorsLayer;

use crate::admission::API_KEY_ENV;
use crate::config::ScanConfig;

/// Configuration for the scan server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host address to bind to.
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9010,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port number.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared state of the request handlers.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub config: Arc<ScanConfig>,
    /// Key expected in the admission webhook URL.
    pub webhook_api_key: Option<String>,
}

impl ServerState {
    pub fn new(config: Arc<ScanConfig>) -> Self {
        Self {
            config,
            webhook_api_key: std::env::var(API_KEY_ENV).ok(),
        }
    }

    pub fn with_webhook_api_key(mut self, key: impl Into<String>) -> Self {
        self.webhook_api_key = Some(key.into());
        self
    }
}

/// Routes of the scan server.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/{iac}/{iac_version}/{cloud}/local/file/scan", post(routes::scan_file))
        .route("/v1/k8s/webhooks/{api_key}/scan/validate", post(routes::validate_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The scan server.
pub struct ScanServer {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl ScanServer {
    pub fn new(config: ServerConfig, scan_config: Arc<ScanConfig>) -> Self {
        Self {
            config,
            state: Arc::new(ServerState::new(scan_config)),
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Runs the server until ctrl-c.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("scan server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down scan server");
            })
            .await
    }

    /// Returns the address the server will listen on.
    pub fn addr(&self) -> String {
        self.config.addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9010);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new().port(8080).host("127.0.0.1");
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_server_addr() {
        let server = ScanServer::new(ServerConfig::default(), Arc::new(ScanConfig::default()));
        assert_eq!(server.addr(), "0.0.0.0:9010");
    }

    #[test]
    fn test_router_builds() {
        let state = ServerState::default().with_webhook_api_key("k");
        let _ = router(Arc::new(state));
    }
}
