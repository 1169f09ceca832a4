// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flood-control handling for Bot API requests.

use std::future::Future;

use teloxide::RequestError;
use tracing::warn;

/// Runs `request`, sleeping and retrying whenever Telegram answers with
/// `RetryAfter`. Gives up after `max_retries` retries and returns the last
/// error. Any other error is returned at once.
pub async fn with_flood_retry<T, F, Fut>(
    max_retries: u32,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt = 0;
    loop {
        match request().await {
            Err(RequestError::RetryAfter(wait)) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    attempt,
                    wait_secs = wait.seconds(),
                    "flood control hit, retrying"
                );
                tokio::time::sleep(wait.duration()).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use teloxide::ApiError;
    use teloxide::types::Seconds;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_flood_retry(3, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RequestError::RetryAfter(Seconds::from_seconds(5)))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_flood_retry(2, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::RetryAfter(Seconds::from_seconds(1)))
        })
        .await;
        assert!(matches!(result, Err(RequestError::RetryAfter(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_flood_retry(5, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::Api(ApiError::BotBlocked))
        })
        .await;
        assert!(matches!(result, Err(RequestError::Api(ApiError::BotBlocked))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
