//! Performance benchmarks for the dispatch, aggregate and stream pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parlor_backend::client::{ClientCache, ClientFactory, MatchFunctionClient};
use parlor_backend::metrics::MetricsCollector;
use parlor_backend::types::{
    ClientKey, FetchRequest, FunctionConfig, Match, MatchProfile, TransportKind,
};
use parlor_backend::{Backend, FetchContext, FetchResult};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Match function answering instantly with two proposals per profile
struct BenchClient;

#[async_trait::async_trait]
impl MatchFunctionClient for BenchClient {
    async fn run(&self, _ctx: &FetchContext, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        Ok(vec![
            Match::with_id(format!("{}-a", profile.name)),
            Match::with_id(format!("{}-b", profile.name)),
        ])
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }
}

struct BenchFactory;

impl ClientFactory for BenchFactory {
    fn create(&self, _key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>> {
        Ok(Arc::new(BenchClient))
    }
}

fn create_bench_backend() -> Backend {
    let cache = Arc::new(ClientCache::new(Arc::new(BenchFactory)));
    Backend::new(cache, Arc::new(MetricsCollector::new().unwrap()))
}

fn request(profiles: usize) -> FetchRequest {
    FetchRequest {
        config: Some(FunctionConfig::rest("bench", "om-bench", 50502)),
        profiles: (0..profiles)
            .map(|i| MatchProfile::named(format!("profile_{}", i)))
            .collect(),
    }
}

fn bench_fetch_proposals(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let backend = create_bench_backend();

    for profiles in [1, 16, 128] {
        let request = request(profiles);
        c.bench_function(&format!("fetch_proposals_{}_profiles", profiles), |b| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        backend
                            .fetch_proposals(&FetchContext::new(), &request)
                            .await,
                    )
                })
            })
        });
    }
}

fn bench_fetch_and_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let backend = create_bench_backend();
    let request = request(32);

    c.bench_function("fetch_and_stream_32_profiles", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let result = backend
                    .fetch_matches(&FetchContext::new(), &request, &tx)
                    .await;
                drop(tx);

                let mut streamed = 0;
                while rx.recv().await.is_some() {
                    streamed += 1;
                }
                black_box((result, streamed))
            })
        })
    });
}

criterion_group!(benches, bench_fetch_proposals, bench_fetch_and_stream);
criterion_main!(benches);
