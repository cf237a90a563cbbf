// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Consensus requests and verdicts, and the one place the
//! required-chain-count policy lives.

use crate::chain::ChainRole;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Vault operations that can be put to cross-chain consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Create,
    Unlock,
    Withdraw,
    Modify,
    EmergencyRecovery,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Unlock => "unlock",
            OperationType::Withdraw => "withdraw",
            OperationType::Modify => "modify",
            OperationType::EmergencyRecovery => "emergency_recovery",
        }
    }
}

/// Security levels at and above this demand unanimous verification for
/// ordinary operations.
pub const UNANIMOUS_SECURITY_LEVEL: u8 = 5;

/// The required-chain-count policy.
///
/// Emergency recovery is destructive and always demands 3-of-3; everything
/// else is 2-of-3 unless the vault's security level asks for unanimity.
/// Callers must not re-derive this mapping.
pub fn required_chains(operation: OperationType, security_level: u8) -> u8 {
    match operation {
        OperationType::EmergencyRecovery => 3,
        _ if security_level >= UNANIMOUS_SECURITY_LEVEL => 3,
        _ => 2,
    }
}

/// A request to establish cross-chain agreement on one vault operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusRequest {
    /// Caller-supplied, unique per operation.
    pub operation_id: String,
    pub operation_type: OperationType,
    pub vault_id: String,
    pub requester: String,
    /// Operation payload, passed to chain verifiers untouched.
    #[serde(default)]
    pub data: serde_json::Value,
    /// 2 or 3; derive via [`required_chains`].
    pub required_chains: u8,
}

/// One chain's verification outcome within a consensus round.
///
/// `verified == false` covers both an explicit negative answer and an
/// unreachable chain; `detail` says which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub chain: ChainRole,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChainVerification {
    pub fn verified(chain: ChainRole) -> Self {
        Self {
            chain,
            verified: true,
            detail: None,
        }
    }

    pub fn rejected(chain: ChainRole) -> Self {
        Self {
            chain,
            verified: false,
            detail: None,
        }
    }

    pub fn unreachable(chain: ChainRole, detail: impl Into<String>) -> Self {
        Self {
            chain,
            verified: false,
            detail: Some(detail.into()),
        }
    }
}

/// Terminal outcome of a consensus round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub operation_id: String,
    pub vault_id: String,
    pub operation_type: OperationType,
    /// One entry per target chain, ordered `Primary < Monitor < Backup`.
    pub verifications: Vec<ChainVerification>,
    pub consensus_reached: bool,
    /// Binds the request and the verifications together; see
    /// [`compute_proof_hash`].
    pub proof_hash: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl ConsensusVerdict {
    pub fn new(
        request: &ConsensusRequest,
        mut verifications: Vec<ChainVerification>,
        timestamp: u64,
    ) -> Self {
        verifications.sort_by_key(|v| v.chain);
        let verified_count = verifications.iter().filter(|v| v.verified).count() as u8;
        let consensus_reached = verified_count >= request.required_chains;
        let proof_hash = compute_proof_hash(request, &verifications);
        Self {
            operation_id: request.operation_id.clone(),
            vault_id: request.vault_id.clone(),
            operation_type: request.operation_type,
            verifications,
            consensus_reached,
            proof_hash,
            timestamp,
        }
    }

    pub fn verified_chains(&self) -> Vec<ChainRole> {
        self.verifications
            .iter()
            .filter(|v| v.verified)
            .map(|v| v.chain)
            .collect()
    }
}

/// SHA3-256 over
/// `operation_id | 0x00 | operation_type | 0x00 | vault_id | 0x00 |
/// required_chains | per chain in role order: chain | verified-byte`.
///
/// Verifications must already be sorted by chain role.
pub fn compute_proof_hash(request: &ConsensusRequest, verifications: &[ChainVerification]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(request.operation_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.operation_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(request.vault_id.as_bytes());
    hasher.update([0u8]);
    hasher.update([request.required_chains]);
    for v in verifications {
        hasher.update(v.chain.as_str().as_bytes());
        hasher.update([v.verified as u8]);
    }
    hex::encode(hasher.finalize())
}
