// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Control-surface request handling, separated from HTTP routing so the
//! router can be exercised against a handler in isolation.

use crate::error::{ConsensusError, ConsensusResult};
use crate::now_ms;
use crate::recovery::{HealthTracker, RecoveryOrchestrator};
use crate::snapshot::SnapshotStore;
use crate::validation::{TimeWeightedValidator, ValidationResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use vault_consensus_types::{ChainHealth, ChainRole, ChainState, RecoveryCase, VaultStateSnapshot};

/// One chain's state as supplied by the caller of createSnapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainStateInput {
    pub state: String,
    pub block_height: u64,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InitiateValidationRequest {
    pub vault_id: String,
    pub value: String,
    pub primary_chain: String,
    #[serde(default)]
    pub request_timestamp: Option<u64>,
    #[serde(default)]
    pub expected_state_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AddConfirmationRequest {
    pub chain: String,
    #[serde(default)]
    pub confirmation_timestamp: Option<u64>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InitiateRecoveryRequest {
    pub vault_id: String,
    pub primary_chain: String,
    pub trigger: String,
}

/// Every chain identifier crossing the control surface is validated against
/// the fixed configured set before any work begins.
fn parse_chain(raw: &str) -> ConsensusResult<ChainRole> {
    raw.parse::<ChainRole>()
        .map_err(|e| ConsensusError::UnknownChain(e.0))
}

#[async_trait]
pub trait ControlRequestHandlerTrait: Send + Sync {
    async fn create_snapshot(
        &self,
        vault_id: String,
        states: BTreeMap<String, ChainStateInput>,
    ) -> ConsensusResult<VaultStateSnapshot>;

    async fn get_snapshot(&self, vault_id: String) -> ConsensusResult<VaultStateSnapshot>;

    async fn initiate_validation(
        &self,
        request: InitiateValidationRequest,
    ) -> ConsensusResult<ValidationResult>;

    async fn add_confirmation(
        &self,
        vault_id: String,
        request: AddConfirmationRequest,
    ) -> ConsensusResult<ValidationResult>;

    async fn get_validation(&self, vault_id: String) -> ConsensusResult<ValidationResult>;

    async fn initiate_recovery(
        &self,
        request: InitiateRecoveryRequest,
    ) -> ConsensusResult<RecoveryCase>;

    async fn get_recovery_status(&self, vault_id: String) -> ConsensusResult<RecoveryCase>;

    async fn get_chain_health(&self, chain: Option<String>) -> ConsensusResult<Vec<ChainHealth>>;
}

pub struct ControlRequestHandler {
    snapshots: Arc<SnapshotStore>,
    validator: Arc<TimeWeightedValidator>,
    recovery: Arc<RecoveryOrchestrator>,
    health: Arc<HealthTracker>,
}

impl ControlRequestHandler {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        validator: Arc<TimeWeightedValidator>,
        recovery: Arc<RecoveryOrchestrator>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            snapshots,
            validator,
            recovery,
            health,
        }
    }
}

#[async_trait]
impl ControlRequestHandlerTrait for ControlRequestHandler {
    async fn create_snapshot(
        &self,
        vault_id: String,
        states: BTreeMap<String, ChainStateInput>,
    ) -> ConsensusResult<VaultStateSnapshot> {
        if states.is_empty() {
            return Err(ConsensusError::InvalidRequest(
                "at least one chain state is required".to_string(),
            ));
        }
        // Validate every chain identifier before recording anything.
        let mut parsed: Vec<(ChainRole, ChainStateInput)> = Vec::with_capacity(states.len());
        for (raw_chain, input) in states {
            parsed.push((parse_chain(&raw_chain)?, input));
        }

        let mut snapshot = None;
        for (chain, input) in parsed {
            let timestamp = input.timestamp.unwrap_or_else(now_ms);
            let state = ChainState::new(chain, input.state, input.block_height, timestamp);
            snapshot = Some(
                self.snapshots
                    .record_observation(&vault_id, chain, state)
                    .await?,
            );
        }
        Ok(snapshot.expect("at least one observation was recorded"))
    }

    async fn get_snapshot(&self, vault_id: String) -> ConsensusResult<VaultStateSnapshot> {
        self.snapshots
            .get_snapshot(&vault_id)
            .await
            .ok_or(ConsensusError::VaultNotFound(vault_id))
    }

    async fn initiate_validation(
        &self,
        request: InitiateValidationRequest,
    ) -> ConsensusResult<ValidationResult> {
        let primary_chain = parse_chain(&request.primary_chain)?;
        self.validator
            .initiate_validation(
                &request.vault_id,
                &request.value,
                primary_chain,
                request.request_timestamp.unwrap_or_else(now_ms),
                request.expected_state_hash,
            )
            .await;
        self.get_validation(request.vault_id).await
    }

    async fn add_confirmation(
        &self,
        vault_id: String,
        request: AddConfirmationRequest,
    ) -> ConsensusResult<ValidationResult> {
        let chain = parse_chain(&request.chain)?;
        self.validator
            .add_confirmation(
                &vault_id,
                chain,
                request.confirmation_timestamp.unwrap_or_else(now_ms),
                request.block_height,
                request.tx_ref,
            )
            .await?;
        self.get_validation(vault_id).await
    }

    async fn get_validation(&self, vault_id: String) -> ConsensusResult<ValidationResult> {
        self.validator
            .get_validation_result(&vault_id)
            .await
            .ok_or(ConsensusError::ValidationNotFound(vault_id))
    }

    async fn initiate_recovery(
        &self,
        request: InitiateRecoveryRequest,
    ) -> ConsensusResult<RecoveryCase> {
        let primary_chain = parse_chain(&request.primary_chain)?;
        self.recovery
            .initiate_recovery(&request.vault_id, primary_chain, &request.trigger)
            .await
    }

    async fn get_recovery_status(&self, vault_id: String) -> ConsensusResult<RecoveryCase> {
        self.recovery
            .get_recovery_status(&vault_id)
            .await
            .ok_or(ConsensusError::RecoveryNotFound(vault_id))
    }

    async fn get_chain_health(&self, chain: Option<String>) -> ConsensusResult<Vec<ChainHealth>> {
        match chain {
            Some(raw) => {
                let chain = parse_chain(&raw)?;
                Ok(vec![self.health.get(chain).await])
            }
            None => Ok(self.health.all().await),
        }
    }
}
