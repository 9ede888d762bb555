use std::time::Duration;

use crate::cancel::Cancellation;
use crate::error::{AiClientError, AiClientResult};

/// Whether a transport-level failure is worth a single retry.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status().map(|s| s.is_server_error()).unwrap_or(false)
}

/// Run `op` once; on a transient failure, sleep 1s and run it exactly once
/// more. Any other failure, or a second failure, propagates as
/// `ProviderUnavailable`.
pub(crate) async fn once_with_backoff<F, Fut, T>(
    cancel: &Cancellation,
    mut op: F,
) -> AiClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    if cancel.is_cancelled() {
        return Err(AiClientError::Cancelled);
    }

    match op().await {
        Ok(v) => Ok(v),
        Err(e) if is_transient(&e) => {
            tracing::warn!(error = %e, "transient LLM provider failure, retrying once");
            tokio::time::sleep(Duration::from_secs(1)).await;
            if cancel.is_cancelled() {
                return Err(AiClientError::Cancelled);
            }
            op().await.map_err(|e| AiClientError::ProviderUnavailable(e.to_string()))
        }
        Err(e) => Err(AiClientError::ProviderUnavailable(e.to_string())),
    }
}
