//! Test fixtures: an in-process HTTP match function and request builders

#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use parlor_backend::client::wire::{RunRequest, RunStreamLine, RUN_PATH};
use parlor_backend::client::ClientCache;
use parlor_backend::config::{FunctionClientSettings, TlsSettings};
use parlor_backend::metrics::MetricsCollector;
use parlor_backend::types::{FetchRequest, FunctionConfig, Match, MatchProfile};
use parlor_backend::Backend;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How long the fake parks a "slow" profile
pub const SLOW_DELAY: Duration = Duration::from_secs(10);

/// HTTP match function whose behaviour is picked by profile name:
///
/// - `fail` answers 500
/// - `remote-error` answers 200 with an error line after one proposal
/// - `slow` waits [`SLOW_DELAY`] before answering
/// - anything else yields `<name>-a` and `<name>-b`
pub struct FakeMatchFunction {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeMatchFunction {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(RUN_PATH, post(run_handler))
            .with_state(hits.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits, handle }
    }

    pub fn port(&self) -> i32 {
        self.addr.port() as i32
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn rest_config(&self) -> FunctionConfig {
        FunctionConfig::rest("fake", "127.0.0.1", self.port())
    }
}

impl Drop for FakeMatchFunction {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_handler(
    State(hits): State<Arc<AtomicUsize>>,
    Json(request): Json<RunRequest>,
) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let name = request.profile.name;

    let lines = match name.as_str() {
        "fail" => return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        "remote-error" => vec![
            RunStreamLine::proposal(Match::with_id("partial")),
            RunStreamLine::failure(13, "profile rejected"),
        ],
        "slow" => {
            tokio::time::sleep(SLOW_DELAY).await;
            vec![RunStreamLine::proposal(Match::with_id("slow-a"))]
        }
        _ => vec![
            RunStreamLine::proposal(Match::with_id(format!("{}-a", name))),
            RunStreamLine::proposal(Match::with_id(format!("{}-b", name))),
        ],
    };

    let body = lines
        .iter()
        .map(|line| serde_json::to_string(line).unwrap() + "\n")
        .collect::<String>();
    (StatusCode::OK, body)
}

/// Backend using the real transport clients
pub fn backend(tls: TlsSettings) -> Backend {
    let cache = Arc::new(ClientCache::with_transports(
        tls,
        FunctionClientSettings::default(),
    ));
    Backend::new(cache, Arc::new(MetricsCollector::new().unwrap()))
}

pub fn insecure_backend() -> Backend {
    backend(TlsSettings::default())
}

pub fn fetch_request(config: FunctionConfig, profiles: &[&str]) -> FetchRequest {
    FetchRequest {
        config: Some(config),
        profiles: profiles.iter().map(|name| MatchProfile::named(*name)).collect(),
    }
}
