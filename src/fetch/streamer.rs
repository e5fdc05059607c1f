//! Delivery of aggregated matches to the caller

use crate::context::FetchContext;
use crate::error::FetchResult;
use crate::fetch::sender::MatchSender;
use crate::types::Match;
use tracing::debug;

/// Push every match through `sender` in order.
///
/// The context is checked before each send, so cancellation is observed
/// between items and never mid-item. Matches already sent stay sent.
pub async fn stream<S>(
    ctx: &FetchContext,
    matches: impl IntoIterator<Item = Match>,
    sender: &S,
) -> FetchResult<()>
where
    S: MatchSender + ?Sized,
{
    for (sent, proposal) in matches.into_iter().enumerate() {
        if let Some(err) = ctx.err() {
            debug!("Streaming stopped after {} match(es): {}", sent, err);
            return Err(err);
        }

        sender.send(proposal).await.map_err(|e| {
            debug!("Streaming failed after {} match(es): {}", sent, e);
            e
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SendError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOTAL_PROPOSALS: usize = 10;
    const FAIL_AT_PROPOSALS: usize = 5;

    /// How the counting sender behaves
    enum Behavior {
        Succeed,
        FailAt(usize),
        CancelAt(usize, FetchContext),
    }

    struct CountingSender {
        count: AtomicUsize,
        behavior: Behavior,
    }

    impl CountingSender {
        fn new(behavior: Behavior) -> Self {
            Self {
                count: AtomicUsize::new(0),
                behavior,
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MatchSender for CountingSender {
        async fn send(&self, _proposal: Match) -> Result<(), SendError> {
            match &self.behavior {
                Behavior::Succeed => {
                    self.count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Behavior::FailAt(at) => {
                    if self.count() == *at {
                        return Err(SendError::new("some err"));
                    }
                    self.count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Behavior::CancelAt(at, ctx) => {
                    let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
                    if count == *at {
                        ctx.cancel();
                    }
                    Ok(())
                }
            }
        }
    }

    fn proposals() -> Vec<Match> {
        (0..TOTAL_PROPOSALS)
            .map(|i| Match::with_id(i.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_sends_everything_without_interference() {
        let ctx = FetchContext::new();
        let sender = CountingSender::new(Behavior::Succeed);

        let result = stream(&ctx, proposals(), &sender).await;
        tokio_test::assert_ok!(result);
        assert_eq!(sender.count(), TOTAL_PROPOSALS);
    }

    #[tokio::test]
    async fn test_stops_on_sender_failure() {
        let ctx = FetchContext::new();
        let sender = CountingSender::new(Behavior::FailAt(FAIL_AT_PROPOSALS));

        let result = stream(&ctx, proposals(), &sender).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, FetchError::Send(_)));
        assert_eq!(sender.count(), FAIL_AT_PROPOSALS);
    }

    #[tokio::test]
    async fn test_stops_when_cancelled_halfway() {
        let ctx = FetchContext::new();
        let sender = CountingSender::new(Behavior::CancelAt(FAIL_AT_PROPOSALS, ctx.clone()));

        let result = stream(&ctx, proposals(), &sender).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(sender.count(), FAIL_AT_PROPOSALS);
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let ctx = FetchContext::new();
        ctx.cancel();
        let sender = CountingSender::new(Behavior::Succeed);

        let result = stream(&ctx, proposals(), &sender).await;
        assert!(result.is_err());
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_never_checks_sender() {
        let ctx = FetchContext::new();
        ctx.cancel();
        let sender = CountingSender::new(Behavior::Succeed);

        tokio_test::assert_ok!(stream(&ctx, Vec::new(), &sender).await);
    }
}
