//! HTTP match function client

use crate::client::trust::TrustMaterial;
use crate::client::wire::{decode_run_stream, RunRequest, RUN_PATH};
use crate::client::MatchFunctionClient;
use crate::config::FunctionClientSettings;
use crate::context::FetchContext;
use crate::error::{FetchError, FetchResult, TransportError};
use crate::types::{FunctionEndpoint, Match, MatchProfile, TransportKind};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error};

/// Resolve the base URL of `endpoint`, rejecting ports outside 1..=65535
/// and hosts that do not form a valid URL.
fn base_url(scheme: &str, endpoint: &FunctionEndpoint) -> FetchResult<String> {
    let invalid = |reason: String| {
        error!(
            "Invalid HTTP match function endpoint {}:{}: {}",
            endpoint.host, endpoint.port, reason
        );
        FetchError::failed_to_connect()
    };

    let port = u16::try_from(endpoint.port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| invalid("port out of range".to_string()))?;

    let raw = format!("{}://{}:{}", scheme, endpoint.host, port);
    let url = reqwest::Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(raw)
}

/// Client for a match function served over HTTP
#[derive(Debug, Clone)]
pub struct RestFunctionClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestFunctionClient {
    /// Build a client for `endpoint`.
    ///
    /// With trust material the client only speaks HTTPS and verifies the
    /// match function against the supplied roots.
    pub fn new(
        endpoint: &FunctionEndpoint,
        trust: Option<&TrustMaterial>,
        settings: &FunctionClientSettings,
    ) -> FetchResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout());

        let scheme = match trust {
            Some(trust) => {
                let certificate = reqwest::Certificate::from_pem(trust.pem()).map_err(|e| {
                    error!(
                        "Invalid trusted certificate {}: {}",
                        trust.path().display(),
                        e
                    );
                    FetchError::failed_to_connect()
                })?;
                builder = builder.add_root_certificate(certificate).https_only(true);
                "https"
            }
            None => "http",
        };

        let base_url = base_url(scheme, endpoint)?;

        let http = builder.build().map_err(|e| {
            error!("Failed to build HTTP match function client: {}", e);
            FetchError::failed_to_connect()
        })?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, ctx: &FetchContext, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        let url = format!("{}{}", self.base_url, RUN_PATH);
        let mut request = self.http.post(&url).json(&RunRequest {
            profile: profile.clone(),
        });
        if let Some(deadline) = ctx.deadline() {
            request = request.timeout(deadline.saturating_duration_since(Instant::now()));
        }

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = response.text().await.map_err(TransportError::from)?;
        decode_run_stream(&body)
    }
}

#[async_trait]
impl MatchFunctionClient for RestFunctionClient {
    async fn run(&self, ctx: &FetchContext, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        debug!(
            "Running HTTP match function at {} for profile '{}'",
            self.base_url, profile.name
        );
        ctx.run(self.call(ctx, profile)).await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }
}
