//! Parlor Backend - match fetching for the matchmaking service
//!
//! This crate fans match profiles out to pluggable match functions over HTTP
//! or AMQP request/reply, aggregates their proposals with fail-fast
//! semantics, and streams the result back to the caller.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use context::FetchContext;
pub use error::{FetchError, FetchResult, Result};
pub use types::*;

// Re-export key components
pub use client::{ClientCache, MatchFunctionClient};
pub use fetch::{Backend, MatchSender};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
