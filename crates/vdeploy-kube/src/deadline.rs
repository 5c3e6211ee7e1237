//! Bounding cluster and helm calls by a timeout and the pass cancellation token

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{KubeError, Result};

/// Run `fut` until it completes, `timeout` elapses, or `cancel` fires
///
/// The future is dropped on expiry, which kills any child process it owns.
pub async fn bounded<T, F>(cancel: &CancellationToken, timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(KubeError::Cancelled),
        res = with_timeout(timeout, fut) => res,
    }
}

async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            KubeError::Timeout(humantime::format_duration(limit).to_string())
        })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let cancel = CancellationToken::new();
        let err = bounded(&cancel, Some(Duration::from_secs(5)), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, KubeError::Timeout(ref t) if t == "5s"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bounded(&cancel, None, async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, KubeError::Cancelled));
    }

    #[tokio::test]
    async fn test_completes_in_time() {
        let cancel = CancellationToken::new();
        let value = bounded(&cancel, Some(Duration::from_secs(5)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
