//! Fetch orchestration: dispatch, aggregate, stream

use crate::client::ClientCache;
use crate::context::FetchContext;
use crate::error::FetchResult;
use crate::fetch::aggregator::aggregate;
use crate::fetch::dispatcher::Dispatcher;
use crate::fetch::sender::MatchSender;
use crate::fetch::streamer::stream;
use crate::metrics::MetricsCollector;
use crate::types::{FetchRequest, Match};
use crate::utils::generate_fetch_id;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Serves fetch requests against a shared client cache
#[derive(Clone)]
pub struct Backend {
    dispatcher: Dispatcher,
    metrics: Arc<MetricsCollector>,
}

impl Backend {
    pub fn new(cache: Arc<ClientCache>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            dispatcher: Dispatcher::new(cache).with_metrics(metrics.clone()),
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        self.dispatcher.cache()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Run the match function for every profile and collect the proposals.
    ///
    /// Invocations run under a child of `ctx` that is cancelled as soon as
    /// this returns (or is dropped), so tasks left behind by a fail-fast or
    /// cancelled fetch stop instead of running to completion.
    pub async fn fetch_proposals(
        &self,
        ctx: &FetchContext,
        request: &FetchRequest,
    ) -> FetchResult<Vec<Match>> {
        let fetch_id = generate_fetch_id();
        let timer = self.metrics.start_timer();
        let function = request
            .config
            .as_ref()
            .map(|config| config.name.as_str())
            .unwrap_or("<none>");

        info!(
            "Fetch {} started - function: '{}', profiles: {}",
            fetch_id,
            function,
            request.profiles.len()
        );

        let scope = ctx.child();
        let _guard = scope.token().clone().drop_guard();

        let result = match self
            .dispatcher
            .dispatch_channel(&scope, request.config.as_ref(), &request.profiles)
        {
            Ok(results) => aggregate(&scope, results, request.profiles.len()).await,
            Err(e) => Err(e),
        };

        let duration = timer.stop();
        self.metrics.record_fetch(
            request.profiles.len(),
            result.as_ref().err().map(|e| e.code()),
            duration,
        );

        match &result {
            Ok(matches) => info!(
                "Fetch {} completed - {} match(es) in {:.2}ms",
                fetch_id,
                matches.len(),
                duration.as_secs_f64() * 1000.0
            ),
            Err(e) if e.is_context_error() => warn!(
                "Fetch {} abandoned after {:.2}ms: {}",
                fetch_id,
                duration.as_secs_f64() * 1000.0,
                e
            ),
            Err(e) => error!(
                "Fetch {} failed after {:.2}ms - code: {}, error: {}",
                fetch_id,
                duration.as_secs_f64() * 1000.0,
                e.code(),
                e
            ),
        }

        result
    }

    /// Stream `matches` to `sender`, recording what was delivered
    pub async fn stream_matches<S>(
        &self,
        ctx: &FetchContext,
        matches: Vec<Match>,
        sender: &S,
    ) -> FetchResult<()>
    where
        S: MatchSender + ?Sized,
    {
        let count = matches.len();
        let result = stream(ctx, matches, sender).await;

        match &result {
            Ok(()) => self.metrics.record_matches_streamed(count),
            Err(e) => {
                warn!("Streaming matches failed: {}", e);
                self.metrics.record_stream_failure(e.code());
            }
        }
        result
    }

    /// Fetch proposals for `request` and stream them to `sender`
    pub async fn fetch_matches<S>(
        &self,
        ctx: &FetchContext,
        request: &FetchRequest,
        sender: &S,
    ) -> FetchResult<()>
    where
        S: MatchSender + ?Sized,
    {
        let matches = self.fetch_proposals(ctx, request).await?;
        self.stream_matches(ctx, matches, sender).await
    }
}
