// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit persistence boundary. The relational implementation
//! lives outside this crate; the engine must keep functioning (audit-only
//! lost) when writes fail, so every call site goes through
//! [`AuditWriter`], which logs failures and moves on.

use crate::metrics::ConsensusMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use vault_consensus_types::{ConsensusVerdict, RecoveryCase, VaultStateSnapshot};

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_verdict(&self, verdict: &ConsensusVerdict) -> Result<(), String>;
    async fn record_snapshot(&self, snapshot: &VaultStateSnapshot) -> Result<(), String>;
    async fn record_recovery(&self, case: &RecoveryCase) -> Result<(), String>;
}

/// In-memory sink: the default in tests and the degraded-mode fallback.
#[derive(Default)]
pub struct MemoryAuditSink {
    verdicts: RwLock<Vec<ConsensusVerdict>>,
    snapshots: RwLock<Vec<VaultStateSnapshot>>,
    recoveries: RwLock<Vec<RecoveryCase>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn verdicts(&self) -> Vec<ConsensusVerdict> {
        self.verdicts.read().await.clone()
    }

    pub async fn snapshots(&self) -> Vec<VaultStateSnapshot> {
        self.snapshots.read().await.clone()
    }

    pub async fn recoveries(&self) -> Vec<RecoveryCase> {
        self.recoveries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record_verdict(&self, verdict: &ConsensusVerdict) -> Result<(), String> {
        self.verdicts.write().await.push(verdict.clone());
        Ok(())
    }

    async fn record_snapshot(&self, snapshot: &VaultStateSnapshot) -> Result<(), String> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn record_recovery(&self, case: &RecoveryCase) -> Result<(), String> {
        self.recoveries.write().await.push(case.clone());
        Ok(())
    }
}

/// Failure-tolerant wrapper around the configured sink. Audit write failures
/// are logged and counted but never block a consensus decision.
#[derive(Clone)]
pub struct AuditWriter {
    sink: Arc<dyn AuditSink>,
    metrics: Arc<ConsensusMetrics>,
}

impl AuditWriter {
    pub fn new(sink: Arc<dyn AuditSink>, metrics: Arc<ConsensusMetrics>) -> Self {
        Self { sink, metrics }
    }

    pub async fn verdict(&self, verdict: &ConsensusVerdict) {
        if let Err(e) = self.sink.record_verdict(verdict).await {
            warn!("Audit write failed for verdict {}: {}", verdict.operation_id, e);
            self.metrics.audit_write_failures.inc();
        }
    }

    pub async fn snapshot(&self, snapshot: &VaultStateSnapshot) {
        if let Err(e) = self.sink.record_snapshot(snapshot).await {
            warn!("Audit write failed for snapshot {}: {}", snapshot.vault_id, e);
            self.metrics.audit_write_failures.inc();
        }
    }

    pub async fn recovery(&self, case: &RecoveryCase) {
        if let Err(e) = self.sink.record_recovery(case).await {
            warn!("Audit write failed for recovery case {}: {}", case.vault_id, e);
            self.metrics.audit_write_failures.inc();
        }
    }
}
