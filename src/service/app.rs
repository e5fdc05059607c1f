//! Main application state
//!
//! This module wires the configuration, client cache, fetch backend and
//! metrics together for the production service.

use crate::client::ClientCache;
use crate::config::AppConfig;
use crate::fetch::Backend;
use crate::metrics::MetricsCollector;
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Fetch pipeline sharing one client cache
    backend: Backend,

    /// Metrics collector shared with the backend
    metrics: Arc<MetricsCollector>,

    /// When the state was created
    started_at: DateTime<Utc>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    /// Parent of every request context; cancelled on shutdown
    shutdown: CancellationToken,

    /// One permit per fetch, held until its response stream ends
    fetch_permits: Arc<Semaphore>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!(
            "Initializing parlor-backend service - name: {}, tls: {}",
            config.service.name, config.tls.enabled
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let cache = Arc::new(ClientCache::with_transports(
            config.tls.clone(),
            config.function.clone(),
        ));
        let backend = Backend::new(cache, metrics.clone());

        Ok(Self::with_backend(config, backend))
    }

    /// Build state around an existing backend
    pub fn with_backend(config: AppConfig, backend: Backend) -> Self {
        let metrics = backend.metrics().clone();
        let fetch_permits = Arc::new(Semaphore::new(config.service.max_concurrent_fetches));
        Self {
            config,
            backend,
            metrics,
            started_at: current_timestamp(),
            is_running: Arc::new(RwLock::new(false)),
            shutdown: CancellationToken::new(),
            fetch_permits,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn fetch_permits(&self) -> &Arc<Semaphore> {
        &self.fetch_permits
    }

    /// Cancel every in-flight fetch and stream
    pub fn begin_shutdown(&self) {
        info!("Cancelling in-flight fetches");
        self.shutdown.cancel();
    }

    /// Check if the service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
        info!(
            "Service marked as {}",
            if running { "running" } else { "stopped" }
        );
    }
}
