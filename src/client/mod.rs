//! Match function clients and the shared client cache
//!
//! A match function is reachable over one of two transports: plain HTTP with
//! newline-delimited JSON responses, or AMQP request/reply. Both are hidden
//! behind [`MatchFunctionClient`] so the fetch pipeline never cares which one
//! it is talking to.

pub mod cache;
pub mod rest;
pub mod rpc;
pub mod trust;
pub mod wire;

use crate::context::FetchContext;
use crate::error::FetchResult;
use crate::types::{Match, MatchProfile, TransportKind};
use async_trait::async_trait;

// Re-export commonly used types
pub use cache::{ClientCache, ClientFactory, TransportClientFactory};
pub use rest::RestFunctionClient;
pub use rpc::RpcFunctionClient;
pub use trust::TrustMaterial;

/// A connection to one match function
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchFunctionClient: Send + Sync {
    /// Run the match function for one profile.
    ///
    /// Implementations must stop waiting once `ctx` is done.
    async fn run(&self, ctx: &FetchContext, profile: &MatchProfile) -> FetchResult<Vec<Match>>;

    /// Transport this client speaks
    fn kind(&self) -> TransportKind;
}
