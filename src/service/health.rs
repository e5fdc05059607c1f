//! Health check reporting
//!
//! Liveness, readiness and a detailed report built from the service's
//! own counters.

use crate::error::ErrorCode;
use crate::service::app::AppState;
use crate::utils::{current_timestamp, seconds_since};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fetches needed before the failure ratio can degrade the service
const DEGRADED_MIN_FETCHES: u64 = 10;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Match function clients currently cached
    pub cached_clients: usize,
    /// Fetches that returned proposals
    pub fetches_succeeded: u64,
    /// Fetches that ended in any error
    pub fetches_failed: u64,
    /// Fetches that failed because a match function was unreachable
    pub fetches_unavailable: u64,
    /// Matches delivered to callers
    pub matches_streamed: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let stats = Self::gather_service_stats(&app_state);

        let function_check = Self::check_match_functions(&stats);
        if function_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(function_check);

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: current_timestamp(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - running, and match functions mostly reachable
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let stats = Self::gather_service_stats(&app_state);
        Ok(Self::check_match_functions(&stats).status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    /// Degraded once most recent fetches could not reach their match function
    fn check_match_functions(stats: &ServiceStats) -> ComponentCheck {
        let total = stats.fetches_succeeded + stats.fetches_failed;
        let (status, message) =
            if total >= DEGRADED_MIN_FETCHES && stats.fetches_unavailable * 2 > total {
                (
                    HealthStatus::Degraded,
                    Some(format!(
                        "{} of {} fetches could not reach a match function",
                        stats.fetches_unavailable, total
                    )),
                )
            } else {
                (HealthStatus::Healthy, None)
            };

        ComponentCheck {
            name: "match_functions".to_string(),
            status,
            message,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let fetch = app_state.metrics().fetch();
        let count = |label: &str| fetch.fetch_requests_total.with_label_values(&[label]).get();

        let fetches_failed = [
            ErrorCode::InvalidArgument,
            ErrorCode::Cancelled,
            ErrorCode::DeadlineExceeded,
            ErrorCode::Unavailable,
            ErrorCode::Internal,
        ]
        .iter()
        .map(|code| count(code.as_str()))
        .sum();

        ServiceStats {
            cached_clients: app_state.backend().cache().len(),
            fetches_succeeded: count("success"),
            fetches_failed,
            fetches_unavailable: count(ErrorCode::Unavailable.as_str()),
            matches_streamed: fetch.matches_streamed_total.get(),
            uptime_seconds: seconds_since(app_state.started_at()),
        }
    }
}

impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::Duration;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(AppConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_not_running_is_unhealthy() {
        let state = state();
        let health = HealthCheck::check(state.clone()).await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            HealthCheck::readiness_check(state).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_running_is_healthy() {
        let state = state();
        state.set_running(true).await;

        let health = HealthCheck::check(state.clone()).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.cached_clients, 0);
        assert!(health.to_json().unwrap().contains("\"healthy\""));
        assert_eq!(
            HealthCheck::liveness_check(state).await.unwrap(),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_unreachable_functions_degrade_readiness() {
        let state = state();
        state.set_running(true).await;

        let metrics = state.metrics();
        for _ in 0..8 {
            metrics.record_fetch(1, Some(ErrorCode::Unavailable), Duration::from_millis(1));
        }
        for _ in 0..4 {
            metrics.record_fetch(1, None, Duration::from_millis(1));
        }

        let health = HealthCheck::check(state.clone()).await.unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.stats.fetches_failed, 8);
        assert_eq!(health.stats.fetches_succeeded, 4);
        assert_eq!(
            HealthCheck::readiness_check(state).await.unwrap(),
            HealthStatus::Degraded
        );
    }
}
