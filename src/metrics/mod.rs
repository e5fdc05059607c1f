//! Metrics and monitoring for the parlor-backend service

pub mod collector;

pub use collector::{ClientMetrics, FetchMetrics, InvocationMetrics, MetricsCollector, MetricsTimer};
