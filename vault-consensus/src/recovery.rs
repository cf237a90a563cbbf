// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain health tracking and failover.
//!
//! Health transitions are strictly `Healthy -> Degraded -> Offline` on
//! consecutive failures, with hysteresis on the way back: a success resets
//! the error count immediately, but a chain is only considered Healthy again
//! after a run of consecutive successes.

use crate::adapter::{ChainAdapter, StateRead};
use crate::audit::AuditWriter;
use crate::config::HealthConfig;
use crate::coordinator::ConsensusCoordinator;
use crate::error::{ConsensusError, ConsensusResult};
use crate::metrics::ConsensusMetrics;
use crate::notify::{Notification, Notifier};
use crate::now_ms;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vault_consensus_types::{
    required_chains, ChainHealth, ChainRole, ConsensusRequest, HealthStatus, OperationType,
    RecoveryCase, RecoveryStatus,
};

struct HealthEntry {
    health: ChainHealth,
    consecutive_errors: u32,
    consecutive_successes: u32,
}

impl HealthEntry {
    fn new(chain: ChainRole) -> Self {
        Self {
            health: ChainHealth::new(chain),
            consecutive_errors: 0,
            consecutive_successes: 0,
        }
    }
}

fn status_rank(status: HealthStatus) -> i64 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded => 1,
        HealthStatus::Offline => 2,
    }
}

/// The one piece of state every adapter call path reports into. All updates
/// go through the single write lock, so counter updates are atomic.
pub struct HealthTracker {
    entries: RwLock<BTreeMap<ChainRole, HealthEntry>>,
    config: HealthConfig,
    notifier: Notifier,
    metrics: Arc<ConsensusMetrics>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, notifier: Notifier, metrics: Arc<ConsensusMetrics>) -> Self {
        let entries = ChainRole::ALL
            .into_iter()
            .map(|chain| (chain, HealthEntry::new(chain)))
            .collect();
        Self {
            entries: RwLock::new(entries),
            config,
            notifier,
            metrics,
        }
    }

    pub async fn record_failure(&self, chain: ChainRole) {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&chain).expect("all chains are tracked");
        entry.health.error_count += 1;
        entry.health.last_failure_at = Some(now_ms());
        entry.consecutive_errors += 1;
        entry.consecutive_successes = 0;

        // One transition per observation: a chain can never jump from
        // Healthy straight to Offline.
        let next = match entry.health.status {
            HealthStatus::Healthy if entry.consecutive_errors >= self.config.degraded_threshold => {
                Some(HealthStatus::Degraded)
            }
            HealthStatus::Degraded if entry.consecutive_errors >= self.config.offline_threshold => {
                Some(HealthStatus::Offline)
            }
            _ => None,
        };
        if let Some(next) = next {
            warn!(
                "[{}] Health transition {} -> {} after {} consecutive errors",
                chain,
                entry.health.status.as_str(),
                next.as_str(),
                entry.consecutive_errors
            );
            entry.health.status = next;
            self.notifier
                .publish(Notification::ChainDegraded(entry.health.clone()));
        }
        self.export(entry);
    }

    pub async fn record_success(&self, chain: ChainRole) {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&chain).expect("all chains are tracked");
        entry.health.error_count = 0;
        entry.health.last_success_at = Some(now_ms());
        entry.consecutive_errors = 0;
        entry.consecutive_successes += 1;

        if entry.health.status != HealthStatus::Healthy
            && entry.consecutive_successes >= self.config.recovery_threshold
        {
            info!(
                "[{}] Health transition {} -> healthy after {} consecutive successes",
                chain,
                entry.health.status.as_str(),
                entry.consecutive_successes
            );
            entry.health.status = HealthStatus::Healthy;
            self.notifier
                .publish(Notification::ChainRestored(entry.health.clone()));
        }
        self.export(entry);
    }

    /// Periodic decay: forgive a slice of the rolling error count. Status is
    /// untouched; only successes move a chain back toward Healthy.
    pub async fn decay_tick(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.health.error_count = entry.health.error_count.saturating_sub(self.config.decay_step);
            self.export(entry);
        }
    }

    fn export(&self, entry: &HealthEntry) {
        self.metrics
            .chain_health_status
            .with_label_values(&[entry.health.chain.as_str()])
            .set(status_rank(entry.health.status));
        self.metrics
            .chain_error_count
            .with_label_values(&[entry.health.chain.as_str()])
            .set(entry.health.error_count as i64);
    }

    pub async fn get(&self, chain: ChainRole) -> ChainHealth {
        let entries = self.entries.read().await;
        entries[&chain].health.clone()
    }

    pub async fn all(&self) -> Vec<ChainHealth> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.health.clone()).collect()
    }

    pub async fn status(&self, chain: ChainRole) -> HealthStatus {
        self.get(chain).await.status
    }

    /// The healthiest chain other than `excluding`, preferring lower error
    /// counts within the same status.
    pub async fn best_fallback(&self, excluding: ChainRole) -> ChainRole {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.health.chain != excluding)
            .min_by_key(|e| (status_rank(e.health.status), e.health.error_count))
            .map(|e| e.health.chain)
            .expect("at least two chains are always tracked")
    }

    /// Periodic decay loop, minutes-scale.
    pub async fn run_decay_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = time::interval(self.config.decay_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health decay loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.decay_tick().await;
                }
            }
        }
    }
}

/// Drives chain failover: opens a RecoveryCase, walks the scripted steps, and
/// concludes it Completed or Failed with the full step log intact.
pub struct RecoveryOrchestrator {
    health: Arc<HealthTracker>,
    adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>>,
    coordinator: Arc<ConsensusCoordinator>,
    cases: RwLock<HashMap<String, RecoveryCase>>,
    notifier: Notifier,
    audit: AuditWriter,
    metrics: Arc<ConsensusMetrics>,
}

impl RecoveryOrchestrator {
    pub fn new(
        health: Arc<HealthTracker>,
        adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>>,
        coordinator: Arc<ConsensusCoordinator>,
        notifier: Notifier,
        audit: AuditWriter,
        metrics: Arc<ConsensusMetrics>,
    ) -> Self {
        Self {
            health,
            adapters,
            coordinator,
            cases: RwLock::new(HashMap::new()),
            notifier,
            audit,
            metrics,
        }
    }

    pub async fn get_recovery_status(&self, vault_id: &str) -> Option<RecoveryCase> {
        self.cases.read().await.get(vault_id).cloned()
    }

    /// Open and drive a recovery case for a vault whose primary chain is
    /// compromised. Every step outcome is appended to the case; the first
    /// failed step concludes the case Failed.
    pub async fn initiate_recovery(
        &self,
        vault_id: &str,
        primary_chain: ChainRole,
        trigger: &str,
    ) -> ConsensusResult<RecoveryCase> {
        {
            let cases = self.cases.read().await;
            if let Some(existing) = cases.get(vault_id) {
                if existing.status == RecoveryStatus::InProgress {
                    return Err(ConsensusError::RecoveryInProgress(vault_id.to_string()));
                }
            }
        }

        let fallback = self.health.best_fallback(primary_chain).await;
        let mut case = RecoveryCase::new(vault_id, primary_chain, fallback, trigger, now_ms());
        info!(
            "Recovery started for vault {} (primary {}, fallback {}, trigger: {})",
            vault_id, primary_chain, fallback, trigger
        );
        self.metrics.recovery_cases_started.inc();
        {
            let mut cases = self.cases.write().await;
            cases.insert(vault_id.to_string(), case.clone());
        }
        self.notifier
            .publish(Notification::RecoveryStarted(case.clone()));

        let mut failed = false;

        // Step 1: the fallback chain must be able to answer for this vault.
        // An explicit not-found is still an answer; only an unreachable chain
        // fails the step.
        let adapter = self
            .adapters
            .get(&fallback)
            .expect("adapter exists for every tracked chain");
        match adapter.read_state(vault_id).await {
            StateRead::Known(state) => {
                self.health.record_success(fallback).await;
                case.record_step(
                    "verify_fallback_availability",
                    true,
                    Some(format!("fallback reports state '{}'", state.state)),
                    now_ms(),
                );
            }
            StateRead::NotFound => {
                self.health.record_success(fallback).await;
                case.record_step(
                    "verify_fallback_availability",
                    true,
                    Some("vault not yet present on fallback".to_string()),
                    now_ms(),
                );
            }
            StateRead::Unreachable(reason) => {
                self.health.record_failure(fallback).await;
                case.record_step("verify_fallback_availability", false, Some(reason), now_ms());
                failed = true;
            }
        }

        // Step 2: re-derive consensus. Emergency recovery is the one path
        // that demands unanimity, so a single unreachable chain fails here.
        if !failed {
            let request = ConsensusRequest {
                operation_id: format!("recovery-{}-{}", vault_id, now_ms()),
                operation_type: OperationType::EmergencyRecovery,
                vault_id: vault_id.to_string(),
                requester: "recovery-orchestrator".to_string(),
                data: serde_json::json!({
                    "trigger": trigger,
                    "fallback_chain": fallback.as_str(),
                }),
                required_chains: required_chains(OperationType::EmergencyRecovery, 0),
            };
            match self.coordinator.process_request(request).await {
                Ok(verdict) if verdict.consensus_reached => {
                    case.record_step(
                        "rederive_cross_chain_consensus",
                        true,
                        Some(format!("proof {}", verdict.proof_hash)),
                        now_ms(),
                    );
                }
                Ok(verdict) => {
                    let confirming = verdict
                        .verified_chains()
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(",");
                    case.record_step(
                        "rederive_cross_chain_consensus",
                        false,
                        Some(format!(
                            "3-of-3 consensus not reached (verified: [{}])",
                            confirming
                        )),
                        now_ms(),
                    );
                    failed = true;
                }
                Err(e) => {
                    error!("Recovery consensus errored for vault {}: {}", vault_id, e);
                    case.record_step(
                        "rederive_cross_chain_consensus",
                        false,
                        Some(e.to_string()),
                        now_ms(),
                    );
                    failed = true;
                }
            }
        }

        case.status = if failed {
            RecoveryStatus::Failed
        } else {
            RecoveryStatus::Completed
        };
        {
            let mut cases = self.cases.write().await;
            cases.insert(vault_id.to_string(), case.clone());
        }
        if failed {
            warn!(
                "Recovery failed for vault {} after {} steps",
                vault_id,
                case.steps.len()
            );
            self.metrics.recovery_cases_failed.inc();
            self.notifier
                .publish(Notification::RecoveryFailed(case.clone()));
        } else {
            info!("Recovery completed for vault {}", vault_id);
            self.metrics.recovery_cases_completed.inc();
            self.notifier
                .publish(Notification::RecoveryCompleted(case.clone()));
        }
        self.audit.recovery(&case).await;
        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(
            HealthConfig::default(),
            Notifier::default(),
            ConsensusMetrics::new_for_testing(),
        )
    }

    #[tokio::test]
    async fn test_healthy_to_degraded_at_threshold() {
        let tracker = tracker();
        for _ in 0..4 {
            tracker.record_failure(ChainRole::Primary).await;
        }
        assert_eq!(tracker.status(ChainRole::Primary).await, HealthStatus::Healthy);
        tracker.record_failure(ChainRole::Primary).await;
        assert_eq!(tracker.status(ChainRole::Primary).await, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_offline_only_via_degraded() {
        let tracker = tracker();
        for i in 1..=10 {
            tracker.record_failure(ChainRole::Monitor).await;
            let status = tracker.status(ChainRole::Monitor).await;
            match i {
                i if i < 5 => assert_eq!(status, HealthStatus::Healthy),
                i if i < 10 => assert_eq!(status, HealthStatus::Degraded),
                _ => assert_eq!(status, HealthStatus::Offline),
            }
        }
    }

    #[tokio::test]
    async fn test_success_resets_errors_but_not_status() {
        let tracker = tracker();
        for _ in 0..5 {
            tracker.record_failure(ChainRole::Primary).await;
        }
        assert_eq!(tracker.status(ChainRole::Primary).await, HealthStatus::Degraded);

        tracker.record_success(ChainRole::Primary).await;
        let health = tracker.get(ChainRole::Primary).await;
        assert_eq!(health.error_count, 0);
        // One success is not enough to be trusted again.
        assert_eq!(health.status, HealthStatus::Degraded);

        tracker.record_success(ChainRole::Primary).await;
        tracker.record_success(ChainRole::Primary).await;
        assert_eq!(tracker.status(ChainRole::Primary).await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_decay_reduces_error_count_only() {
        let tracker = tracker();
        for _ in 0..5 {
            tracker.record_failure(ChainRole::Backup).await;
        }
        let before = tracker.get(ChainRole::Backup).await;
        assert_eq!(before.error_count, 5);
        assert_eq!(before.status, HealthStatus::Degraded);

        tracker.decay_tick().await;
        let after = tracker.get(ChainRole::Backup).await;
        assert_eq!(after.error_count, 4);
        assert_eq!(after.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_degraded_transition_notifies() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        let tracker = HealthTracker::new(
            HealthConfig::default(),
            notifier,
            ConsensusMetrics::new_for_testing(),
        );
        for _ in 0..5 {
            tracker.record_failure(ChainRole::Primary).await;
        }
        match rx.recv().await.unwrap() {
            Notification::ChainDegraded(health) => {
                assert_eq!(health.chain, ChainRole::Primary);
                assert_eq!(health.status, HealthStatus::Degraded);
            }
            other => panic!("unexpected notification {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_best_fallback_prefers_healthier_chain() {
        let tracker = tracker();
        // Monitor degrades; backup stays healthy.
        for _ in 0..5 {
            tracker.record_failure(ChainRole::Monitor).await;
        }
        assert_eq!(
            tracker.best_fallback(ChainRole::Primary).await,
            ChainRole::Backup
        );
        // Excluding backup, the degraded monitor is the only option left.
        assert_eq!(
            tracker.best_fallback(ChainRole::Backup).await,
            ChainRole::Monitor
        );
    }

    mod orchestrator {
        use super::*;
        use crate::test_utils::TestHarness;
        use vault_consensus_types::ChainState;

        fn orchestrator(h: &TestHarness) -> RecoveryOrchestrator {
            let metrics = ConsensusMetrics::new_for_testing();
            RecoveryOrchestrator::new(
                h.health.clone(),
                h.adapters(),
                h.coordinator.clone(),
                h.notifier.clone(),
                AuditWriter::new(h.audit_sink.clone(), metrics.clone()),
                metrics,
            )
        }

        #[tokio::test]
        async fn test_recovery_completes() {
            let h = TestHarness::new();
            for chain in ChainRole::ALL {
                h.adapter(chain).set_default_verify(Ok(true));
            }
            // All chains healthy, so monitor is the preferred fallback.
            h.adapter(ChainRole::Monitor).set_state(
                "vault-1",
                StateRead::Known(ChainState::new(ChainRole::Monitor, "locked", 50, 1_000)),
            );

            let orchestrator = orchestrator(&h);
            let case = orchestrator
                .initiate_recovery("vault-1", ChainRole::Primary, "primary offline")
                .await
                .unwrap();

            assert_eq!(case.status, RecoveryStatus::Completed);
            assert_eq!(case.fallback_chain, ChainRole::Monitor);
            assert_eq!(case.steps.len(), 2);
            assert!(case.steps.iter().all(|s| s.success));
            assert_eq!(
                orchestrator.get_recovery_status("vault-1").await.unwrap().status,
                RecoveryStatus::Completed
            );
        }

        #[tokio::test]
        async fn test_recovery_fails_when_fallback_unreachable() {
            let h = TestHarness::new();
            h.adapter(ChainRole::Monitor).set_state(
                "vault-1",
                StateRead::Unreachable("connection refused".to_string()),
            );

            let orchestrator = orchestrator(&h);
            let case = orchestrator
                .initiate_recovery("vault-1", ChainRole::Primary, "primary offline")
                .await
                .unwrap();

            assert_eq!(case.status, RecoveryStatus::Failed);
            // The case concluded after the failed availability step, with the
            // partial log intact for audit.
            assert_eq!(case.steps.len(), 1);
            assert!(!case.steps[0].success);
            assert_eq!(case.steps[0].action, "verify_fallback_availability");
        }

        #[tokio::test]
        async fn test_recovery_fails_without_unanimous_consensus() {
            // Only 2 of 3 chains reachable: the 3-of-3 emergency gate fails.
            let h = TestHarness::new();
            h.adapter(ChainRole::Primary).set_default_verify(Ok(true));
            h.adapter(ChainRole::Monitor).set_default_verify(Ok(true));
            h.adapter(ChainRole::Backup)
                .set_default_verify(Err(crate::adapter::AdapterError::Rpc(
                    "connection refused".to_string(),
                )));
            h.adapter(ChainRole::Monitor).set_state(
                "vault-1",
                StateRead::Known(ChainState::new(ChainRole::Monitor, "locked", 50, 1_000)),
            );

            let orchestrator = orchestrator(&h);
            let mut notifications = h.notifier.subscribe();
            let case = orchestrator
                .initiate_recovery("vault-1", ChainRole::Primary, "primary compromised")
                .await
                .unwrap();

            assert_eq!(case.status, RecoveryStatus::Failed);
            assert_eq!(case.steps.len(), 2);
            assert!(case.steps[0].success);
            assert!(!case.steps[1].success);

            match notifications.recv().await.unwrap() {
                Notification::RecoveryStarted(started) => {
                    assert_eq!(started.vault_id, "vault-1")
                }
                other => panic!("unexpected notification {}", other.kind()),
            }
        }
    }
}
