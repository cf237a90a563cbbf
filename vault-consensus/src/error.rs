// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use vault_consensus_types::ChainRole;

/// Engine-wide error type. Every public operation returns a typed outcome;
/// none of these escape as process-level faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    // All endpoints for a chain were exhausted
    AdapterUnavailable(ChainRole),
    // The upstream endpoint signalled rate limiting
    RateLimited(String),
    // The vault is not known on the queried chain
    VaultNotFound(String),
    // Chain identifier outside the configured set
    UnknownChain(String),
    // Duplicate operation id submitted while the original is still pending
    DuplicateOperation(String),
    // A validation window was never opened for this vault
    ValidationNotFound(String),
    // No recovery case exists for this vault
    RecoveryNotFound(String),
    // A recovery case for this vault is already in progress
    RecoveryInProgress(String),
    // Authorization validator rejected the operation
    ValidatorRejected { validator: String, reason: String },
    // Audit persistence failed (non-blocking, recorded for diagnostics)
    StorageError(String),
    // Recomputed hash disagreed with the stored one, or another invariant broke.
    // Fatal to the operation in question only.
    InvariantViolation(String),
    // Malformed request at the control surface
    InvalidRequest(String),
    // Uncategorized error
    Generic(String),
}

impl ConsensusError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            ConsensusError::AdapterUnavailable(_) => "adapter_unavailable",
            ConsensusError::RateLimited(_) => "rate_limited",
            ConsensusError::VaultNotFound(_) => "vault_not_found",
            ConsensusError::UnknownChain(_) => "unknown_chain",
            ConsensusError::DuplicateOperation(_) => "duplicate_operation",
            ConsensusError::ValidationNotFound(_) => "validation_not_found",
            ConsensusError::RecoveryNotFound(_) => "recovery_not_found",
            ConsensusError::RecoveryInProgress(_) => "recovery_in_progress",
            ConsensusError::ValidatorRejected { .. } => "validator_rejected",
            ConsensusError::StorageError(_) => "storage_error",
            ConsensusError::InvariantViolation(_) => "invariant_violation",
            ConsensusError::InvalidRequest(_) => "invalid_request",
            ConsensusError::Generic(_) => "generic",
        }
    }
}

impl std::fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusError::AdapterUnavailable(chain) => {
                write!(f, "adapter unavailable for chain {}", chain)
            }
            ConsensusError::RateLimited(msg) => write!(f, "rate limited: {}", msg),
            ConsensusError::VaultNotFound(vault) => write!(f, "vault not found: {}", vault),
            ConsensusError::UnknownChain(chain) => write!(f, "unknown chain: {}", chain),
            ConsensusError::DuplicateOperation(op) => write!(f, "duplicate operation: {}", op),
            ConsensusError::ValidationNotFound(vault) => {
                write!(f, "no open validation for vault {}", vault)
            }
            ConsensusError::RecoveryNotFound(vault) => {
                write!(f, "no recovery case for vault {}", vault)
            }
            ConsensusError::RecoveryInProgress(vault) => {
                write!(f, "recovery already in progress for vault {}", vault)
            }
            ConsensusError::ValidatorRejected { validator, reason } => {
                write!(f, "validator {} rejected: {}", validator, reason)
            }
            ConsensusError::StorageError(msg) => write!(f, "storage error: {}", msg),
            ConsensusError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            ConsensusError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            ConsensusError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConsensusError {}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
