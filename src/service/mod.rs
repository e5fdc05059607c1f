//! Service layer for the parlor-backend fetch service
//!
//! This module contains the application state, health reporting and the
//! HTTP server exposing the fetch pipeline.

pub mod app;
pub mod health;
pub mod http;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
pub use http::{router, FetchResponseLine, HttpServer, FETCH_PATH};
