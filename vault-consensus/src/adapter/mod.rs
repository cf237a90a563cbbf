// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain adapters: one ledger presented as a uniform source of vault events
//! and point-in-time vault state reads. Adapters hold no authoritative state;
//! everything here is network I/O and connection resilience.

mod endpoints;
mod rpc;

pub use endpoints::*;
pub use rpc::*;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use vault_consensus_types::{ChainRole, ChainState, ConsensusRequest, VaultEvent};

/// Error type for adapter operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("all endpoints exhausted for {0}")]
    Unavailable(ChainRole),
}

impl AdapterError {
    /// Whether the upstream signalled rate limiting. connect() retries these
    /// on the same endpoint before advancing.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AdapterError::RateLimited(_))
    }

    /// Whether this error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdapterError::Rpc(_) | AdapterError::RateLimited(_) | AdapterError::Timeout(_)
        )
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Outcome of a best-effort vault state read.
///
/// `NotFound` is a permanent answer from a healthy chain; `Unreachable` is a
/// chain failure and feeds the health tracker. Neither is an error to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRead {
    Known(ChainState),
    NotFound,
    Unreachable(String),
}

impl StateRead {
    pub fn is_known(&self) -> bool {
        matches!(self, StateRead::Known(_))
    }
}

/// One ledger, normalized.
///
/// The watch loop lives in the ingestion layer; adapters expose the reads it
/// needs plus the per-chain verification capability the coordinator fans out
/// to.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainRole;

    /// Establish connectivity, walking the prioritized endpoint list.
    /// Exhausting every endpoint yields `AdapterError::Unavailable`; it never
    /// panics or aborts the process.
    async fn connect(&self) -> AdapterResult<()>;

    /// Latest observed native block ref.
    async fn head_ref(&self) -> AdapterResult<u64>;

    /// Bounded-range event fetch, `from_ref..=to_ref`. Implementations cap
    /// the range at their configured maximum (never more than 1000 native
    /// blocks per call).
    async fn poll_events(&self, from_ref: u64, to_ref: u64) -> AdapterResult<Vec<VaultEvent>>;

    /// Best-effort state read. Failures come back as `StateRead::Unreachable`,
    /// never as an Err.
    async fn read_state(&self, vault_id: &str) -> StateRead;

    /// This chain's view of whether the requested operation is consistent
    /// with on-chain vault state. An Err means the chain could not be
    /// consulted and counts as unverified, never as verified.
    async fn verify_operation(&self, request: &ConsensusRequest) -> AdapterResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AdapterError::RateLimited("429".to_string()).is_rate_limit());
        assert!(!AdapterError::Rpc("boom".to_string()).is_rate_limit());

        assert!(AdapterError::Timeout("slow".to_string()).is_recoverable());
        assert!(!AdapterError::Unavailable(ChainRole::Primary).is_recoverable());
        assert!(!AdapterError::InvalidResponse("garbage".to_string()).is_recoverable());
    }
}
