//! Fan-in of invocation outcomes

use crate::context::FetchContext;
use crate::error::{FetchError, FetchResult};
use crate::types::{InvocationOutcome, Match};
use tokio::sync::mpsc;
use tracing::debug;

/// Collect `expected` outcomes from `results` into one match list.
///
/// Returns early with the context error if `ctx` is done first, or with the
/// first outcome error seen. Outcomes not yet received are discarded. On
/// success the matches are concatenated in receipt order.
pub async fn aggregate(
    ctx: &FetchContext,
    mut results: mpsc::Receiver<InvocationOutcome>,
    expected: usize,
) -> FetchResult<Vec<Match>> {
    let mut matches = Vec::new();

    for received in 0..expected {
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => {
                debug!(
                    "Aggregation stopped after {}/{} outcomes: {}",
                    received, expected, err
                );
                return Err(err);
            }
            outcome = results.recv() => outcome,
        };

        let outcome = outcome.ok_or_else(|| {
            FetchError::internal(format!(
                "match function results channel closed after {} of {} outcomes",
                received, expected
            ))
        })?;

        if let Some(err) = outcome.error {
            debug!(
                "Aggregation failing fast after {}/{} outcomes: {}",
                received + 1,
                expected,
                err
            );
            return Err(err);
        }
        matches.extend(outcome.matches);
    }

    Ok(matches)
}
