// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Normalized vault events as emitted by chain adapters.

use crate::chain::ChainRole;
use crate::consensus::OperationType;
use serde::{Deserialize, Serialize};

/// What happened to a vault on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultEventKind {
    Created,
    Unlocked,
    Deposit,
    Withdrawal,
    VerificationRequested,
    EmergencyRecovery,
}

impl VaultEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultEventKind::Created => "created",
            VaultEventKind::Unlocked => "unlocked",
            VaultEventKind::Deposit => "deposit",
            VaultEventKind::Withdrawal => "withdrawal",
            VaultEventKind::VerificationRequested => "verification_requested",
            VaultEventKind::EmergencyRecovery => "emergency_recovery",
        }
    }

    /// Events that auto-initiate a consensus round when observed, mapped to
    /// the operation the round verifies.
    pub fn auto_consensus_operation(&self) -> Option<OperationType> {
        match self {
            VaultEventKind::Unlocked => Some(OperationType::Unlock),
            VaultEventKind::Withdrawal => Some(OperationType::Withdraw),
            _ => None,
        }
    }
}

impl std::str::FromStr for VaultEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(VaultEventKind::Created),
            "unlocked" => Ok(VaultEventKind::Unlocked),
            "deposit" => Ok(VaultEventKind::Deposit),
            "withdrawal" => Ok(VaultEventKind::Withdrawal),
            "verification_requested" => Ok(VaultEventKind::VerificationRequested),
            "emergency_recovery" => Ok(VaultEventKind::EmergencyRecovery),
            other => Err(format!("unknown vault event kind: {}", other)),
        }
    }
}

/// A normalized chain occurrence. Immutable once constructed; identity is
/// `(chain, tx_ref)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEvent {
    pub vault_id: String,
    pub chain: ChainRole,
    pub kind: VaultEventKind,
    /// Chain-native block number/slot. Opaque to the engine.
    pub native_block_ref: u64,
    /// Chain-native transaction identifier. Opaque to the engine.
    pub tx_ref: String,
    /// Ingestion timestamp, unix milliseconds.
    pub observed_at: u64,
    /// Kind-specific data, passed through untouched.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl VaultEvent {
    /// Deduplication key. Two events with the same key are the same event.
    pub fn event_key(&self) -> String {
        format!("{}:{}", self.chain, self.tx_ref)
    }
}
