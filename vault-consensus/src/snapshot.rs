// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Authoritative per-vault cross-chain view.
//!
//! Latest state per `(vault, chain)` is replace-on-write; every write also
//! appends the resulting snapshot to an append-only history for audit.
//! Writes to the same vault serialize through a per-vault lock so the root
//! hash is always computed against a consistent state set; different vaults
//! never contend.

use crate::audit::AuditWriter;
use crate::error::{ConsensusError, ConsensusResult};
use crate::metrics::ConsensusMetrics;
use crate::now_ms;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};
use vault_consensus_types::{
    compute_root_hash, ChainRole, ChainState, VaultStateSnapshot,
};

#[derive(Default)]
struct VaultEntry {
    latest: Option<VaultStateSnapshot>,
    history: Vec<VaultStateSnapshot>,
}

pub struct SnapshotStore {
    vaults: RwLock<HashMap<String, Arc<Mutex<VaultEntry>>>>,
    audit: AuditWriter,
    metrics: Arc<ConsensusMetrics>,
}

impl SnapshotStore {
    pub fn new(audit: AuditWriter, metrics: Arc<ConsensusMetrics>) -> Self {
        Self {
            vaults: RwLock::new(HashMap::new()),
            audit,
            metrics,
        }
    }

    async fn entry(&self, vault_id: &str) -> Arc<Mutex<VaultEntry>> {
        {
            let vaults = self.vaults.read().await;
            if let Some(entry) = vaults.get(vault_id) {
                return entry.clone();
            }
        }
        let mut vaults = self.vaults.write().await;
        vaults
            .entry(vault_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VaultEntry::default())))
            .clone()
    }

    /// Replace the state for `(vault_id, chain)`, recompute the root, append
    /// to history. Returns the new snapshot.
    pub async fn record_observation(
        &self,
        vault_id: &str,
        chain: ChainRole,
        state: ChainState,
    ) -> ConsensusResult<VaultStateSnapshot> {
        let entry = self.entry(vault_id).await;
        let mut entry = entry.lock().await;

        let mut chain_states: BTreeMap<ChainRole, ChainState> = entry
            .latest
            .as_ref()
            .map(|s| s.chain_states.clone())
            .unwrap_or_default();
        chain_states.insert(chain, state);

        let snapshot = VaultStateSnapshot::new(vault_id, chain_states, now_ms());

        // The root must be a pure function of the chain states. Recompute and
        // compare; a mismatch means corrupted state and halts this vault's
        // operation without touching the committed snapshot.
        let recomputed = compute_root_hash(&snapshot.vault_id, &snapshot.chain_states);
        if recomputed != snapshot.root_hash {
            error!(
                "Root hash mismatch for vault {}: {} vs {}",
                vault_id, snapshot.root_hash, recomputed
            );
            self.metrics.snapshot_invariant_violations.inc();
            return Err(ConsensusError::InvariantViolation(format!(
                "root hash recomputation mismatch for vault {}",
                vault_id
            )));
        }

        entry.latest = Some(snapshot.clone());
        entry.history.push(snapshot.clone());
        debug!(
            "Recorded observation for vault {} on {}: root={}",
            vault_id,
            chain,
            &snapshot.root_hash[..8]
        );
        self.metrics
            .snapshots_recorded
            .with_label_values(&[chain.as_str()])
            .inc();

        self.audit.snapshot(&snapshot).await;
        Ok(snapshot)
    }

    /// Latest snapshot, or None if the vault has never been observed.
    pub async fn get_snapshot(&self, vault_id: &str) -> Option<VaultStateSnapshot> {
        let vaults = self.vaults.read().await;
        let entry = vaults.get(vault_id)?.clone();
        drop(vaults);
        let entry = entry.lock().await;
        entry.latest.clone()
    }

    /// Full append-only snapshot history for a vault, oldest first.
    pub async fn history(&self, vault_id: &str) -> Vec<VaultStateSnapshot> {
        let vaults = self.vaults.read().await;
        let Some(entry) = vaults.get(vault_id).cloned() else {
            return Vec::new();
        };
        drop(vaults);
        let entry = entry.lock().await;
        entry.history.clone()
    }
}
