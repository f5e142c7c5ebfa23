//! Cooperative cancellation at suspension points.

use std::future::Future;

use ragbot_core::{RagError, Result};
use tokio_util::sync::CancellationToken;

/// Run `future` unless `token` is, or becomes, cancelled first.
///
/// The token is checked before the future is first polled, so a request
/// cancelled between two calls never starts the second. If cancellation wins
/// the race, `future` is dropped along with anything it holds.
pub async fn run_cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(RagError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RagError::Cancelled),
        result = future => result,
    }
}
