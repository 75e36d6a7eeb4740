// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Bounded backoff-retry for idempotent verbs, used only against `Unavailable` (spec §7:
//! "the retry is bounded ... and only for idempotent operations; otherwise the Adapter
//! surfaces `Unavailable` immediately").

use std::future::Future;
use std::time::Duration;

use crate::errors::FabricError;

/// Small, fixed retry budget. Three attempts total matches the teacher's backend-call retry
/// shape (one retry after the first failure), extended by one extra attempt since Adapter
/// calls cross a reconnecting connection manager rather than a single stable channel.
const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(50);

/// Calls `f` up to a small, fixed number of times, retrying only on `FabricError::Unavailable`.
/// Every other error kind is returned immediately on the first attempt, per spec §7: a
/// non-idempotent or non-retryable failure must never be silently repeated against the
/// backend. Callers are responsible for only invoking this around verbs they have declared
/// idempotent (spec §4.5).
pub async fn retry_idempotent<T, F, Fut>(mut f: F) -> Result<T, FabricError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FabricError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(BASE_DELAY * attempt).await;
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_without_retry_on_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry_idempotent(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FabricError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_unavailable_until_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FabricError> = retry_idempotent(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FabricError::Unavailable("down".to_owned())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_kinds() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FabricError> = retry_idempotent(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FabricError::NotFound("missing".to_owned())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = retry_idempotent(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FabricError::Unavailable("flaky".to_owned()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
