//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the parlor-backend service
//! using Prometheus metrics.

use crate::error::ErrorCode;
use crate::types::TransportKind;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the backend service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Fetch request metrics
    fetch_metrics: FetchMetrics,

    /// Match function invocation metrics
    invocation_metrics: InvocationMetrics,

    /// Client cache metrics
    client_metrics: ClientMetrics,
}

/// Fetch request metrics
#[derive(Clone)]
pub struct FetchMetrics {
    /// Fetch requests by outcome
    pub fetch_requests_total: IntCounterVec,

    /// Time from dispatch until aggregation finishes
    pub fetch_duration_seconds: Histogram,

    /// Profiles handed to the dispatcher
    pub profiles_dispatched_total: IntCounter,

    /// Matches delivered to callers
    pub matches_streamed_total: IntCounter,

    /// Streaming failures by cause
    pub stream_failures_total: IntCounterVec,
}

/// Match function invocation metrics
#[derive(Clone)]
pub struct InvocationMetrics {
    /// Invocations by transport and status
    pub invocations_total: IntCounterVec,

    /// Invocation latency by transport
    pub invocation_duration_seconds: HistogramVec,
}

/// Client cache metrics
#[derive(Clone)]
pub struct ClientMetrics {
    /// Clients currently cached
    pub cached_clients: IntGauge,

    /// Client construction failures by transport
    pub client_failures_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let fetch_metrics = FetchMetrics::new(&registry)?;
        let invocation_metrics = InvocationMetrics::new(&registry)?;
        let client_metrics = ClientMetrics::new(&registry)?;

        Ok(Self {
            registry,
            fetch_metrics,
            invocation_metrics,
            client_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn fetch(&self) -> &FetchMetrics {
        &self.fetch_metrics
    }

    pub fn invocation(&self) -> &InvocationMetrics {
        &self.invocation_metrics
    }

    pub fn client(&self) -> &ClientMetrics {
        &self.client_metrics
    }

    /// Record a finished fetch; `error` is `None` on success
    pub fn record_fetch(&self, profiles: usize, error: Option<ErrorCode>, duration: Duration) {
        let outcome = error.map(|code| code.as_str()).unwrap_or("success");

        self.fetch_metrics
            .fetch_requests_total
            .with_label_values(&[outcome])
            .inc();

        self.fetch_metrics
            .profiles_dispatched_total
            .inc_by(profiles as u64);

        self.fetch_metrics
            .fetch_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record one match function invocation
    pub fn record_invocation(&self, transport: TransportKind, success: bool, duration: Duration) {
        let transport = transport.to_string();
        let status = if success { "success" } else { "error" };

        self.invocation_metrics
            .invocations_total
            .with_label_values(&[transport.as_str(), status])
            .inc();

        self.invocation_metrics
            .invocation_duration_seconds
            .with_label_values(&[transport.as_str()])
            .observe(duration.as_secs_f64());
    }

    /// Record matches successfully pushed to a caller
    pub fn record_matches_streamed(&self, count: usize) {
        self.fetch_metrics
            .matches_streamed_total
            .inc_by(count as u64);
    }

    pub fn record_stream_failure(&self, code: ErrorCode) {
        self.fetch_metrics
            .stream_failures_total
            .with_label_values(&[code.as_str()])
            .inc();
    }

    pub fn record_client_failure(&self, transport: TransportKind) {
        self.client_metrics
            .client_failures_total
            .with_label_values(&[transport.to_string().as_str()])
            .inc();
    }

    pub fn set_cached_clients(&self, count: usize) {
        self.client_metrics.cached_clients.set(count as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl FetchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let fetch_requests_total = IntCounterVec::new(
            Opts::new(
                "parlor_backend_fetch_requests_total",
                "Total fetch requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(fetch_requests_total.clone()))?;

        let fetch_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "parlor_backend_fetch_duration_seconds",
            "Time spent dispatching and aggregating a fetch",
        ))?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;

        let profiles_dispatched_total = IntCounter::new(
            "parlor_backend_profiles_dispatched_total",
            "Total match profiles dispatched",
        )?;
        registry.register(Box::new(profiles_dispatched_total.clone()))?;

        let matches_streamed_total = IntCounter::new(
            "parlor_backend_matches_streamed_total",
            "Total matches streamed to callers",
        )?;
        registry.register(Box::new(matches_streamed_total.clone()))?;

        let stream_failures_total = IntCounterVec::new(
            Opts::new(
                "parlor_backend_stream_failures_total",
                "Total streaming failures by cause",
            ),
            &["code"],
        )?;
        registry.register(Box::new(stream_failures_total.clone()))?;

        Ok(Self {
            fetch_requests_total,
            fetch_duration_seconds,
            profiles_dispatched_total,
            matches_streamed_total,
            stream_failures_total,
        })
    }
}

impl InvocationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let invocations_total = IntCounterVec::new(
            Opts::new(
                "parlor_backend_invocations_total",
                "Total match function invocations",
            ),
            &["transport", "status"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let invocation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "parlor_backend_invocation_duration_seconds",
                "Match function invocation latency",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(invocation_duration_seconds.clone()))?;

        Ok(Self {
            invocations_total,
            invocation_duration_seconds,
        })
    }
}

impl ClientMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let cached_clients = IntGauge::new(
            "parlor_backend_cached_clients",
            "Match function clients currently cached",
        )?;
        registry.register(Box::new(cached_clients.clone()))?;

        let client_failures_total = IntCounterVec::new(
            Opts::new(
                "parlor_backend_client_failures_total",
                "Total match function client construction failures",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(client_failures_total.clone()))?;

        Ok(Self {
            cached_clients,
            client_failures_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
