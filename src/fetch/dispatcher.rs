//! Fan-out of match profiles to a match function
//!
//! One task is spawned per profile with no worker cap. Every task publishes
//! exactly one [`InvocationOutcome`] onto the shared result channel. The
//! channel must hold one slot per profile so that no task blocks once the
//! aggregator stops draining.

use crate::client::{ClientCache, MatchFunctionClient};
use crate::context::FetchContext;
use crate::error::FetchResult;
use crate::metrics::MetricsCollector;
use crate::types::{FunctionConfig, FunctionReference, InvocationOutcome, MatchProfile};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Result channel sized so every invocation can publish without a reader
pub fn result_channel(
    profiles: usize,
) -> (
    mpsc::Sender<InvocationOutcome>,
    mpsc::Receiver<InvocationOutcome>,
) {
    mpsc::channel(profiles.max(1))
}

/// Launches one match function invocation per profile
#[derive(Clone)]
pub struct Dispatcher {
    cache: Arc<ClientCache>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(cache: Arc<ClientCache>) -> Self {
        Self {
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Validate `config` and start one invocation per profile.
    ///
    /// Returns as soon as the tasks are spawned. Validation and client
    /// construction errors are returned before any invocation starts.
    /// `results` must have capacity for `profiles.len()` outcomes.
    pub fn dispatch(
        &self,
        ctx: &FetchContext,
        config: Option<&FunctionConfig>,
        profiles: &[MatchProfile],
        results: &mpsc::Sender<InvocationOutcome>,
    ) -> FetchResult<()> {
        let reference = FunctionReference::resolve(config)?;
        let key = reference.cache_key();

        let client = match self.cache.get_client(&key) {
            Ok(client) => client,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_client_failure(key.kind);
                }
                return Err(e);
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_cached_clients(self.cache.len());
        }

        debug!(
            "Dispatching {} profile(s) to match function {}",
            profiles.len(),
            key
        );

        for profile in profiles {
            self.spawn_invocation(ctx.clone(), client.clone(), profile.clone(), results.clone());
        }

        Ok(())
    }

    /// Allocate a correctly sized result channel and dispatch into it
    pub fn dispatch_channel(
        &self,
        ctx: &FetchContext,
        config: Option<&FunctionConfig>,
        profiles: &[MatchProfile],
    ) -> FetchResult<mpsc::Receiver<InvocationOutcome>> {
        let (tx, rx) = result_channel(profiles.len());
        self.dispatch(ctx, config, profiles, &tx)?;
        Ok(rx)
    }

    fn spawn_invocation(
        &self,
        ctx: FetchContext,
        client: Arc<dyn MatchFunctionClient>,
        profile: MatchProfile,
        results: mpsc::Sender<InvocationOutcome>,
    ) {
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let started = std::time::Instant::now();
            // Stops waiting on the client once the fetch is abandoned
            let result = ctx.run(client.run(&ctx, &profile)).await;

            if let Some(metrics) = &metrics {
                metrics.record_invocation(client.kind(), result.is_ok(), started.elapsed());
            }
            match &result {
                Ok(matches) => debug!(
                    "Profile '{}' produced {} match(es) in {:.2}ms",
                    profile.name,
                    matches.len(),
                    started.elapsed().as_secs_f64() * 1000.0
                ),
                Err(e) => warn!("Match function failed for profile '{}': {}", profile.name, e),
            }

            if results.send(InvocationOutcome::from(result)).await.is_err() {
                debug!(
                    "Result channel closed, dropping outcome for profile '{}'",
                    profile.name
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientFactory, MockMatchFunctionClient};
    use crate::error::{FetchError, TransportError, UNSUPPORTED_FUNCTION_TYPE};
    use crate::types::{ClientKey, Match, TransportKind};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory returning one prepared client and counting runs through it
    struct StaticFactory {
        client: Arc<dyn MatchFunctionClient>,
    }

    impl ClientFactory for StaticFactory {
        fn create(&self, _key: &ClientKey) -> FetchResult<Arc<dyn MatchFunctionClient>> {
            Ok(self.client.clone())
        }
    }

    fn dispatcher_with(client: MockMatchFunctionClient) -> Dispatcher {
        let factory = StaticFactory {
            client: Arc::new(client),
        };
        Dispatcher::new(Arc::new(ClientCache::new(Arc::new(factory))))
    }

    fn echo_client(calls: Arc<AtomicUsize>) -> MockMatchFunctionClient {
        let mut client = MockMatchFunctionClient::new();
        client.expect_kind().return_const(TransportKind::Rest);
        client.expect_run().returning(move |_, profile| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Match::with_id(format!("match-{}", profile.name))])
        });
        client
    }

    fn profiles(n: usize) -> Vec<MatchProfile> {
        (1..=n).map(|i| MatchProfile::named(i.to_string())).collect()
    }

    #[tokio::test]
    async fn test_publishes_one_outcome_per_profile() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(echo_client(calls.clone()));
        let config = FunctionConfig::rest("test", "om-test", 54321);
        let profiles = profiles(8);

        let mut rx = dispatcher
            .dispatch_channel(&FetchContext::new(), Some(&config), &profiles)
            .unwrap();

        let mut ids = HashSet::new();
        for _ in 0..profiles.len() {
            let outcome = rx.recv().await.unwrap();
            assert!(outcome.error.is_none());
            assert_eq!(outcome.matches.len(), 1);
            ids.insert(outcome.matches[0].match_id.clone());
        }

        let expected: HashSet<_> = (1..=8).map(|i| format!("match-{}", i)).collect();
        assert_eq!(ids, expected);
        assert_eq!(calls.load(Ordering::SeqCst), 8);

        // Every task dropped its sender after publishing once
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_config_starts_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(echo_client(calls.clone()));
        let (tx, _rx) = result_channel(2);

        for config in [None, Some(FunctionConfig::default())] {
            let err = dispatcher
                .dispatch(&FetchContext::new(), config.as_ref(), &profiles(2), &tx)
                .unwrap_err();
            assert!(matches!(err, FetchError::InvalidArgument { .. }));
            assert_eq!(err.to_string(), UNSUPPORTED_FUNCTION_TYPE);
        }

        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_invocation_error_carries_empty_matches() {
        let mut client = MockMatchFunctionClient::new();
        client.expect_kind().return_const(TransportKind::Rpc);
        client.expect_run().returning(|_, profile| {
            if profile.name == "2" {
                Err(TransportError::Remote {
                    message: "no pool".to_string(),
                }
                .into())
            } else {
                Ok(vec![Match::with_id(profile.name.clone())])
            }
        });
        let dispatcher = dispatcher_with(client);
        let config = FunctionConfig::rpc("test", "om-test", 54321);

        let mut rx = dispatcher
            .dispatch_channel(&FetchContext::new(), Some(&config), &profiles(3))
            .unwrap();

        let mut failures = 0;
        for _ in 0..3 {
            let outcome = rx.recv().await.unwrap();
            if outcome.error.is_some() {
                failures += 1;
                assert!(outcome.matches.is_empty());
            }
        }
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_empty_profiles_dispatch_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(echo_client(calls.clone()));
        let config = FunctionConfig::rest("test", "om-test", 54321);

        let mut rx = dispatcher
            .dispatch_channel(&FetchContext::new(), Some(&config), &[])
            .unwrap();
        assert!(rx.recv().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_records_invocation_metrics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let dispatcher = dispatcher_with(echo_client(calls)).with_metrics(metrics.clone());
        let config = FunctionConfig::rest("test", "om-test", 54321);

        let mut rx = dispatcher
            .dispatch_channel(&FetchContext::new(), Some(&config), &profiles(2))
            .unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        assert_eq!(
            metrics
                .invocation()
                .invocations_total
                .with_label_values(&["rest", "success"])
                .get(),
            2
        );
        assert_eq!(metrics.client().cached_clients.get(), 1);
    }
}
