// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The decision point: given a consensus request, ask every target chain to
//! verify the operation concurrently and conclude as soon as the outcome is
//! mathematically decided, in either direction. Never waits on the slowest
//! chain once the answer is known.

use crate::adapter::{ChainAdapter, StateRead};
use crate::audit::AuditWriter;
use crate::authorization::ValidatorRegistry;
use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, ConsensusResult};
use crate::ingest::EventBus;
use crate::metrics::ConsensusMetrics;
use crate::notify::{Notification, Notifier};
use crate::now_ms;
use crate::recovery::HealthTracker;
use crate::snapshot::SnapshotStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vault_consensus_types::{
    required_chains, ChainRole, ChainState, ChainVerification, ConsensusRequest, ConsensusVerdict,
    HealthStatus, OperationType, VaultEvent,
};

/// Lifecycle of a request while the coordinator holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Pending,
    Verifying,
}

pub struct ConsensusCoordinator {
    adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>>,
    health: Arc<HealthTracker>,
    snapshots: Arc<SnapshotStore>,
    validators: ValidatorRegistry,
    notifier: Notifier,
    audit: AuditWriter,
    metrics: Arc<ConsensusMetrics>,
    config: ConsensusConfig,
    inflight: RwLock<BTreeMap<String, RequestPhase>>,
}

impl ConsensusCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>>,
        health: Arc<HealthTracker>,
        snapshots: Arc<SnapshotStore>,
        validators: ValidatorRegistry,
        notifier: Notifier,
        audit: AuditWriter,
        metrics: Arc<ConsensusMetrics>,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            adapters,
            health,
            snapshots,
            validators,
            notifier,
            audit,
            metrics,
            config,
            inflight: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Run one consensus request to a terminal verdict.
    ///
    /// Chain quorum is always evaluated to completion (or short-circuit);
    /// authorization validators then gate full approval, and a rejection
    /// surfaces as a structured error after the chain verdict has been
    /// recorded for diagnostics.
    pub async fn process_request(
        &self,
        request: ConsensusRequest,
    ) -> ConsensusResult<ConsensusVerdict> {
        if !(2..=3).contains(&request.required_chains) {
            return Err(ConsensusError::InvalidRequest(format!(
                "required_chains must be 2 or 3, got {}",
                request.required_chains
            )));
        }
        if request.operation_type == OperationType::EmergencyRecovery && request.required_chains != 3
        {
            return Err(ConsensusError::InvalidRequest(
                "emergency recovery requires unanimous 3-of-3 verification".to_string(),
            ));
        }

        {
            let mut inflight = self.inflight.write().await;
            if inflight.contains_key(&request.operation_id) {
                return Err(ConsensusError::DuplicateOperation(request.operation_id));
            }
            inflight.insert(request.operation_id.clone(), RequestPhase::Pending);
        }
        self.metrics
            .consensus_requests
            .with_label_values(&[request.operation_type.as_str()])
            .inc();

        let verdict = self.verify_round(&request).await;
        self.inflight.write().await.remove(&request.operation_id);

        self.audit.verdict(&verdict).await;
        if verdict.consensus_reached {
            self.metrics
                .consensus_reached
                .with_label_values(&[request.operation_type.as_str()])
                .inc();
        } else {
            self.metrics
                .consensus_failed
                .with_label_values(&[request.operation_type.as_str()])
                .inc();
        }

        // Full approval requires every configured authorization validator on
        // top of chain quorum. The chain verdict above is already recorded,
        // so a rejection here still leaves the diagnostics behind.
        if verdict.consensus_reached {
            if let Err(e) = self.validators.validate_all(&request).await {
                warn!(
                    "Operation {} reached chain consensus but was rejected: {}",
                    request.operation_id, e
                );
                self.notifier
                    .publish(Notification::ConsensusFailed(verdict));
                return Err(e);
            }
            info!(
                "Consensus reached for operation {} ({} of {} chains)",
                request.operation_id,
                verdict.verified_chains().len(),
                request.required_chains
            );
            self.notifier
                .publish(Notification::ConsensusReached(verdict.clone()));
        } else {
            info!(
                "Consensus failed for operation {} (verified: {:?})",
                request.operation_id,
                verdict.verified_chains()
            );
            self.notifier
                .publish(Notification::ConsensusFailed(verdict.clone()));
        }
        Ok(verdict)
    }

    /// Fan verification out to all three chains and collect until the quorum
    /// question is decided.
    async fn verify_round(&self, request: &ConsensusRequest) -> ConsensusVerdict {
        {
            let mut inflight = self.inflight.write().await;
            inflight.insert(request.operation_id.clone(), RequestPhase::Verifying);
        }

        let required = request.required_chains as usize;
        let total = ChainRole::ALL.len();
        let mut outcomes: BTreeMap<ChainRole, ChainVerification> = BTreeMap::new();

        let mut pending: FuturesUnordered<_> = ChainRole::ALL
            .into_iter()
            .map(|chain| self.verify_one(chain, request))
            .collect();

        let decided = tokio::time::timeout(self.config.request_timeout, async {
            while let Some(verification) = pending.next().await {
                outcomes.insert(verification.chain, verification);
                let verified = outcomes.values().filter(|v| v.verified).count();
                let failed = outcomes.len() - verified;
                if verified >= required {
                    debug!(
                        "Operation {}: quorum reached with {} confirmations",
                        request.operation_id, verified
                    );
                    break;
                }
                if failed > total - required {
                    // Even if every outstanding chain verified, the quorum
                    // can no longer be met.
                    debug!(
                        "Operation {}: quorum mathematically unreachable ({} failures)",
                        request.operation_id, failed
                    );
                    break;
                }
            }
        })
        .await;
        drop(pending);

        let fill_detail = match decided {
            Ok(()) => "not awaited; quorum already decided",
            Err(_) => {
                warn!(
                    "Operation {} timed out after {:?}",
                    request.operation_id, self.config.request_timeout
                );
                "verification timed out"
            }
        };
        for chain in ChainRole::ALL {
            outcomes
                .entry(chain)
                .or_insert_with(|| ChainVerification::unreachable(chain, fill_detail));
        }

        ConsensusVerdict::new(request, outcomes.into_values().collect(), now_ms())
    }

    /// One chain's verification. Ambiguity never counts toward quorum: an
    /// unreachable or skipped chain is unverified, full stop.
    async fn verify_one(&self, chain: ChainRole, request: &ConsensusRequest) -> ChainVerification {
        if self.health.status(chain).await == HealthStatus::Offline {
            debug!(
                "[{}] Skipping verification for {}: chain offline",
                chain, request.operation_id
            );
            return ChainVerification::unreachable(chain, "chain offline, skipped");
        }
        let adapter = self
            .adapters
            .get(&chain)
            .expect("adapter exists for every tracked chain");
        let start = Instant::now();
        let result = adapter.verify_operation(request).await;
        self.metrics
            .verification_latency
            .with_label_values(&[chain.as_str()])
            .observe(start.elapsed().as_secs_f64());
        match result {
            Ok(true) => {
                self.health.record_success(chain).await;
                ChainVerification::verified(chain)
            }
            Ok(false) => {
                self.health.record_success(chain).await;
                ChainVerification::rejected(chain)
            }
            Err(e) => {
                warn!(
                    "[{}] Verification for {} failed: {}",
                    chain, request.operation_id, e
                );
                self.health.record_failure(chain).await;
                ChainVerification::unreachable(chain, e.to_string())
            }
        }
    }

    /// Refresh the snapshot store from live chain reads. Chains that cannot
    /// answer are recorded with the explicit unknown state.
    pub async fn refresh_snapshot(&self, vault_id: &str) {
        for (chain, adapter) in &self.adapters {
            let state = match adapter.read_state(vault_id).await {
                StateRead::Known(state) => {
                    self.health.record_success(*chain).await;
                    state
                }
                StateRead::NotFound => {
                    self.health.record_success(*chain).await;
                    ChainState::unknown(*chain, now_ms())
                }
                StateRead::Unreachable(reason) => {
                    warn!("[{}] State read failed for {}: {}", chain, vault_id, reason);
                    self.health.record_failure(*chain).await;
                    ChainState::unknown(*chain, now_ms())
                }
            };
            if let Err(e) = self
                .snapshots
                .record_observation(vault_id, *chain, state)
                .await
            {
                warn!(
                    "Snapshot update for vault {} on {} halted: {}",
                    vault_id, chain, e
                );
            }
        }
    }

    /// Observed unlock/withdrawal events auto-initiate consensus. This is
    /// the automatic trigger: the engine does not wait to be asked.
    pub async fn run_auto_trigger(
        self: Arc<Self>,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) {
        let mut rx = bus.subscribe_filtered(|e| e.kind.auto_consensus_operation().is_some());
        // Delivery is at-least-once; remember what was already triggered.
        let mut triggered: HashSet<String> = HashSet::new();
        info!("Auto-trigger loop started");
        loop {
            let event: VaultEvent = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Auto-trigger loop cancelled");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                }
            };
            let operation_id = format!("auto-{}", event.event_key());
            if !triggered.insert(operation_id.clone()) {
                continue;
            }
            if triggered.len() > 10_000 {
                triggered.clear();
            }

            let operation_type = event
                .kind
                .auto_consensus_operation()
                .expect("subscription filter guarantees a consensus-triggering kind");
            let security_level = self.config.security_level_for(&event.vault_id);
            let request = ConsensusRequest {
                operation_id,
                operation_type,
                vault_id: event.vault_id.clone(),
                requester: "event-ingestion".to_string(),
                data: serde_json::json!({
                    "chain": event.chain.as_str(),
                    "tx_ref": event.tx_ref,
                    "block_ref": event.native_block_ref,
                }),
                required_chains: required_chains(operation_type, security_level),
            };
            info!(
                "Auto-initiating {} consensus for vault {} from {} event on {}",
                operation_type.as_str(),
                event.vault_id,
                event.kind.as_str(),
                event.chain
            );
            self.refresh_snapshot(&event.vault_id).await;
            match self.process_request(request).await {
                Ok(_) => {}
                Err(ConsensusError::DuplicateOperation(_)) => {}
                Err(e) => warn!(
                    "Auto-initiated consensus for vault {} errored: {}",
                    event.vault_id, e
                ),
            }
        }
    }
}
