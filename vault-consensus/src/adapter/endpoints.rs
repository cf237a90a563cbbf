// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Prioritized-endpoint connection logic.
//!
//! Rate-limit failures retry the same endpoint with exponential backoff
//! (base, 2x, 4x — i.e. 2s/4s/8s at the production base); any other failure
//! moves straight to the next endpoint. Exhausting the list yields
//! `AdapterError::Unavailable` so the surrounding system keeps running in
//! degraded mode.

use super::AdapterError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use vault_consensus_types::ChainRole;

/// Retries per endpoint when the failure is a rate-limit signal.
pub const RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Production backoff base; attempt n sleeps `base * 2^n` (2s, 4s, 8s).
pub const RATE_LIMIT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Walk `endpoints` in priority order, probing each with `probe`. Returns the
/// index of the first endpoint that answers.
pub async fn connect_with_fallback<F, Fut>(
    chain: ChainRole,
    endpoints: &[String],
    backoff_base: Duration,
    probe: F,
) -> Result<usize, AdapterError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(), AdapterError>>,
{
    for (index, endpoint) in endpoints.iter().enumerate() {
        let mut attempt = 0u32;
        loop {
            match probe(endpoint.clone()).await {
                Ok(()) => {
                    info!("[{}] Connected to endpoint {} ({})", chain, index, endpoint);
                    return Ok(index);
                }
                Err(e) if e.is_rate_limit() && attempt + 1 < RATE_LIMIT_ATTEMPTS => {
                    let delay = backoff_base * 2u32.pow(attempt);
                    warn!(
                        "[{}] Endpoint {} rate limited (attempt {}/{}), backing off {:?}",
                        chain,
                        endpoint,
                        attempt + 1,
                        RATE_LIMIT_ATTEMPTS,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "[{}] Endpoint {} failed ({}), trying next endpoint",
                        chain, endpoint, e
                    );
                    break;
                }
            }
        }
    }
    warn!(
        "[{}] All {} endpoints exhausted, adapter unavailable",
        chain,
        endpoints.len()
    );
    Err(AdapterError::Unavailable(chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://node-{}.example", i)).collect()
    }

    #[tokio::test]
    async fn test_first_endpoint_wins() {
        let index = connect_with_fallback(
            ChainRole::Primary,
            &endpoints(3),
            Duration::from_millis(1),
            |_| async { Ok(()) },
        )
        .await
        .unwrap();
        assert_eq!(index, 0);
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_advances_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let index = connect_with_fallback(
            ChainRole::Primary,
            &endpoints(3),
            Duration::from_millis(1),
            move |endpoint| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if endpoint.contains("node-2") {
                        Ok(())
                    } else {
                        Err(AdapterError::Rpc("connection refused".to_string()))
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(index, 2);
        // One attempt per failed endpoint, no rate-limit retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_endpoint() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let index = connect_with_fallback(
            ChainRole::Monitor,
            &endpoints(1),
            Duration::from_millis(1),
            move |_| {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AdapterError::RateLimited("429".to_string()))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(index, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_unavailable() {
        let err = connect_with_fallback(
            ChainRole::Backup,
            &endpoints(2),
            Duration::from_millis(1),
            |_| async { Err(AdapterError::RateLimited("429".to_string())) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable(ChainRole::Backup)));
    }
}
