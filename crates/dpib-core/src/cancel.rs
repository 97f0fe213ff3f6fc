//! Cooperative cancellation at suspension points

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancelled first
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    guard(tokio::time::sleep(duration), cancel).await
}

/// Drive `fut` to completion unless cancelled first.
///
/// A cancelled future is dropped, which closes any socket it owns.
pub async fn guard<F: Future>(fut: F, cancel: &CancellationToken) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let cancel = CancellationToken::new();
        assert!(sleep(Duration::from_secs(1), &cancel).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_observes_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result = sleep(Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_guard_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guard(async { 42 }, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
