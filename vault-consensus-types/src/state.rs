// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain vault states and the tamper-evident cross-chain snapshot.
//!
//! # Canonical hashing
//!
//! `state_hash` and `root_hash` are SHA3-256 digests, hex encoded, over a
//! canonical byte layout so that independent implementations reproduce the
//! same digests from the same inputs:
//!
//! - `state_hash` = SHA3-256 of
//!   `chain.as_str() | 0x00 | state | 0x00 | block_height (8 bytes LE) | timestamp (8 bytes LE)`
//! - `root_hash` = SHA3-256 of
//!   `vault_id | 0x00` followed by, for each present chain in
//!   `Primary < Monitor < Backup` order,
//!   `chain.as_str() | 0x00 | state | 0x00 | block_height (8 bytes LE) | timestamp (8 bytes LE) | state_hash | 0x00`
//!
//! Every field participates, so a single-field change anywhere changes the
//! root.

use crate::chain::ChainRole;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;

/// Latest observed state of one vault on one chain. Overwritten on each new
/// observation; prior values survive only in the snapshot history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain: ChainRole,
    /// Free-form label agreed with the chain adapter ("active", "locked", ...).
    pub state: String,
    pub block_height: u64,
    /// Unix milliseconds.
    pub timestamp: u64,
    /// Content hash of the fields above, see module docs.
    pub state_hash: String,
}

impl ChainState {
    pub fn new(chain: ChainRole, state: impl Into<String>, block_height: u64, timestamp: u64) -> Self {
        let state = state.into();
        let state_hash = compute_state_hash(chain, &state, block_height, timestamp);
        Self {
            chain,
            state,
            block_height,
            timestamp,
            state_hash,
        }
    }

    /// The sentinel state recorded when a chain could not be read.
    pub fn unknown(chain: ChainRole, timestamp: u64) -> Self {
        Self::new(chain, "unknown", 0, timestamp)
    }

    pub fn is_unknown(&self) -> bool {
        self.state == "unknown"
    }
}

fn hash_chain_state_fields(
    hasher: &mut Sha3_256,
    chain: ChainRole,
    state: &str,
    block_height: u64,
    timestamp: u64,
) {
    hasher.update(chain.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(state.as_bytes());
    hasher.update([0u8]);
    hasher.update(block_height.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());
}

pub fn compute_state_hash(chain: ChainRole, state: &str, block_height: u64, timestamp: u64) -> String {
    let mut hasher = Sha3_256::new();
    hash_chain_state_fields(&mut hasher, chain, state, block_height, timestamp);
    hex::encode(hasher.finalize())
}

/// Aggregate over all chain states for one vault. A new snapshot replaces the
/// prior one; history is kept separately, append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStateSnapshot {
    pub vault_id: String,
    /// Keyed by role; `BTreeMap` iteration order is the canonical hash order.
    pub chain_states: BTreeMap<ChainRole, ChainState>,
    pub root_hash: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl VaultStateSnapshot {
    pub fn new(
        vault_id: impl Into<String>,
        chain_states: BTreeMap<ChainRole, ChainState>,
        timestamp: u64,
    ) -> Self {
        let vault_id = vault_id.into();
        let root_hash = compute_root_hash(&vault_id, &chain_states);
        Self {
            vault_id,
            chain_states,
            root_hash,
            timestamp,
        }
    }
}

/// Deterministic root over the chain states. See module docs for the layout.
pub fn compute_root_hash(vault_id: &str, chain_states: &BTreeMap<ChainRole, ChainState>) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(vault_id.as_bytes());
    hasher.update([0u8]);
    for (chain, cs) in chain_states {
        hash_chain_state_fields(&mut hasher, *chain, &cs.state, cs.block_height, cs.timestamp);
        hasher.update(cs.state_hash.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple() -> BTreeMap<ChainRole, ChainState> {
        let mut states = BTreeMap::new();
        states.insert(
            ChainRole::Primary,
            ChainState::new(ChainRole::Primary, "locked", 100, 1_000),
        );
        states.insert(
            ChainRole::Monitor,
            ChainState::new(ChainRole::Monitor, "locked", 50, 1_000),
        );
        states.insert(ChainRole::Backup, ChainState::unknown(ChainRole::Backup, 1_000));
        states
    }

    #[test]
    fn test_root_hash_deterministic() {
        let a = compute_root_hash("vault-1", &triple());
        let b = compute_root_hash("vault-1", &triple());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // 256-bit digest, hex encoded
    }

    #[test]
    fn test_root_hash_insert_order_independent() {
        // BTreeMap sorts by role, so the insertion order of observations
        // cannot change the root.
        let mut reversed = BTreeMap::new();
        reversed.insert(ChainRole::Backup, ChainState::unknown(ChainRole::Backup, 1_000));
        reversed.insert(
            ChainRole::Monitor,
            ChainState::new(ChainRole::Monitor, "locked", 50, 1_000),
        );
        reversed.insert(
            ChainRole::Primary,
            ChainState::new(ChainRole::Primary, "locked", 100, 1_000),
        );
        assert_eq!(
            compute_root_hash("vault-1", &triple()),
            compute_root_hash("vault-1", &reversed)
        );
    }

    #[test]
    fn test_root_hash_changes_on_height_only_update() {
        // Same state label, height 100 -> 101: the root must change.
        let before = compute_root_hash("vault-1", &triple());
        let mut states = triple();
        states.insert(
            ChainRole::Primary,
            ChainState::new(ChainRole::Primary, "locked", 101, 1_000),
        );
        let after = compute_root_hash("vault-1", &states);
        assert_ne!(before, after);
    }

    #[test]
    fn test_root_hash_changes_on_vault_id() {
        assert_ne!(
            compute_root_hash("vault-1", &triple()),
            compute_root_hash("vault-2", &triple())
        );
    }

    #[test]
    fn test_state_hash_binds_every_field() {
        let base = compute_state_hash(ChainRole::Primary, "locked", 100, 1_000);
        assert_ne!(base, compute_state_hash(ChainRole::Monitor, "locked", 100, 1_000));
        assert_ne!(base, compute_state_hash(ChainRole::Primary, "unlocked", 100, 1_000));
        assert_ne!(base, compute_state_hash(ChainRole::Primary, "locked", 101, 1_000));
        assert_ne!(base, compute_state_hash(ChainRole::Primary, "locked", 100, 1_001));
    }

    #[test]
    fn test_field_separator_prevents_concatenation_collisions() {
        // "ab" + "c" must not hash like "a" + "bc".
        let a = compute_state_hash(ChainRole::Primary, "ab", 100, 1_000);
        let b = compute_state_hash(ChainRole::Primary, "a", 100, 1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_snapshot_constructor_computes_root() {
        let snapshot = VaultStateSnapshot::new("vault-1", triple(), 2_000);
        assert_eq!(snapshot.root_hash, compute_root_hash("vault-1", &triple()));
        assert_eq!(snapshot.chain_states.len(), 3);
    }
}
