//! Main application configuration
//!
//! This module defines the primary configuration structures for the backend
//! service, including environment variable and TOML file loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub tls: TlsSettings,
    pub function: FunctionClientSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address the HTTP server binds to
    pub http_host: String,
    /// Port for the fetch, health and metrics endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Maximum fetch requests served concurrently
    pub max_concurrent_fetches: usize,
}

/// Trust material for secure match function connections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Connect to match functions over TLS
    pub enabled: bool,
    /// PEM file holding the trusted root certificate(s)
    pub trusted_certificate_path: Option<PathBuf>,
}

/// Settings shared by every match function client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionClientSettings {
    /// Per-invocation timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Queue the RPC-style match functions consume requests from
    pub rpc_queue: String,
    pub rpc_username: String,
    pub rpc_password: String,
    pub rpc_vhost: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "parlor-backend".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 51505,
            shutdown_timeout_seconds: 30,
            max_concurrent_fetches: 1000,
        }
    }
}

impl Default for FunctionClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            rpc_queue: "matchfunction.run".to_string(),
            rpc_username: "guest".to_string(),
            rpc_password: "guest".to_string(),
            rpc_vhost: "/".to_string(),
        }
    }
}

impl FunctionClientSettings {
    /// Get per-invocation timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = parse_var("HTTP_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }
        if let Ok(max) = env::var("MAX_CONCURRENT_FETCHES") {
            self.service.max_concurrent_fetches = parse_var("MAX_CONCURRENT_FETCHES", &max)?;
        }

        // TLS settings
        if let Ok(enabled) = env::var("TLS_ENABLED") {
            self.tls.enabled = parse_var("TLS_ENABLED", &enabled)?;
        }
        if let Ok(path) = env::var("TLS_TRUSTED_CERTIFICATE_PATH") {
            self.tls.trusted_certificate_path = Some(PathBuf::from(path));
        }

        // Match function client settings
        if let Ok(timeout) = env::var("MMF_REQUEST_TIMEOUT_MS") {
            self.function.request_timeout_ms = parse_var("MMF_REQUEST_TIMEOUT_MS", &timeout)?;
        }
        if let Ok(timeout) = env::var("MMF_CONNECT_TIMEOUT_MS") {
            self.function.connect_timeout_ms = parse_var("MMF_CONNECT_TIMEOUT_MS", &timeout)?;
        }
        if let Ok(queue) = env::var("MMF_RPC_QUEUE") {
            self.function.rpc_queue = queue;
        }
        if let Ok(username) = env::var("MMF_RPC_USERNAME") {
            self.function.rpc_username = username;
        }
        if let Ok(password) = env::var("MMF_RPC_PASSWORD") {
            self.function.rpc_password = password;
        }
        if let Ok(vhost) = env::var("MMF_RPC_VHOST") {
            self.function.rpc_vhost = vhost;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values.
///
/// TLS enabled without a certificate path is accepted here; client
/// construction reports it per match function.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.http_host.is_empty() {
        return Err(anyhow!("HTTP host cannot be empty"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.max_concurrent_fetches == 0 {
        return Err(anyhow!("Max concurrent fetches must be greater than 0"));
    }

    // Validate match function client settings
    if config.function.request_timeout_ms == 0 {
        return Err(anyhow!("Match function request timeout must be greater than 0"));
    }
    if config.function.connect_timeout_ms == 0 {
        return Err(anyhow!("Match function connect timeout must be greater than 0"));
    }
    if config.function.rpc_queue.is_empty() {
        return Err(anyhow!("RPC queue name cannot be empty"));
    }

    Ok(())
}
