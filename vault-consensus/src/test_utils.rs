// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared test fixtures: a fully wired engine over scripted mock adapters.

use crate::adapter::mock::MockChainAdapter;
use crate::adapter::ChainAdapter;
use crate::audit::{AuditWriter, MemoryAuditSink};
use crate::authorization::ValidatorRegistry;
use crate::config::{ConsensusConfig, HealthConfig};
use crate::coordinator::ConsensusCoordinator;
use crate::ingest::EventBus;
use crate::metrics::ConsensusMetrics;
use crate::notify::Notifier;
use crate::recovery::HealthTracker;
use crate::snapshot::SnapshotStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use vault_consensus_types::{ChainRole, ConsensusRequest, OperationType};

pub struct TestHarness {
    pub mocks: BTreeMap<ChainRole, MockChainAdapter>,
    pub coordinator: Arc<ConsensusCoordinator>,
    pub health: Arc<HealthTracker>,
    pub notifier: Notifier,
    pub audit_sink: Arc<MemoryAuditSink>,
    pub store: Arc<SnapshotStore>,
    pub bus: Arc<EventBus>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(ConsensusConfig::default(), ValidatorRegistry::empty())
    }

    pub fn with_request_timeout(timeout: Duration) -> Self {
        let config = ConsensusConfig {
            request_timeout: timeout,
            ..Default::default()
        };
        Self::build(config, ValidatorRegistry::empty())
    }

    pub fn with_validators(validators: ValidatorRegistry) -> Self {
        Self::build(ConsensusConfig::default(), validators)
    }

    pub fn build(config: ConsensusConfig, validators: ValidatorRegistry) -> Self {
        let metrics = ConsensusMetrics::new_for_testing();
        let notifier = Notifier::new(64);
        let audit_sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditWriter::new(audit_sink.clone(), metrics.clone());
        let health = Arc::new(HealthTracker::new(
            HealthConfig::default(),
            notifier.clone(),
            metrics.clone(),
        ));
        let store = Arc::new(SnapshotStore::new(audit.clone(), metrics.clone()));
        let bus = Arc::new(EventBus::new(64, metrics.clone()));

        let mut mocks = BTreeMap::new();
        let mut adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>> = BTreeMap::new();
        for chain in ChainRole::ALL {
            let mock = MockChainAdapter::new(chain);
            adapters.insert(chain, Arc::new(mock.clone()) as Arc<dyn ChainAdapter>);
            mocks.insert(chain, mock);
        }

        let coordinator = Arc::new(ConsensusCoordinator::new(
            adapters,
            health.clone(),
            store.clone(),
            validators,
            notifier.clone(),
            audit,
            metrics,
            config,
        ));

        Self {
            mocks,
            coordinator,
            health,
            notifier,
            audit_sink,
            store,
            bus,
        }
    }

    pub fn adapter(&self, chain: ChainRole) -> &MockChainAdapter {
        &self.mocks[&chain]
    }

    pub fn adapters(&self) -> BTreeMap<ChainRole, Arc<dyn ChainAdapter>> {
        self.mocks
            .iter()
            .map(|(chain, mock)| (*chain, Arc::new(mock.clone()) as Arc<dyn ChainAdapter>))
            .collect()
    }
}

pub fn consensus_request(
    operation_id: &str,
    operation_type: OperationType,
    required_chains: u8,
) -> ConsensusRequest {
    ConsensusRequest {
        operation_id: operation_id.to_string(),
        operation_type,
        vault_id: "vault-1".to_string(),
        requester: "tester".to_string(),
        data: serde_json::Value::Null,
        required_chains,
    }
}
