// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-weighted confirmation scoring.
//!
//! A confirmation on a slow chain is weak evidence the moment it lands and
//! stronger evidence as blocks pile on top of it, so each confirming chain
//! contributes a base weight plus an age bonus that saturates at the
//! configured maturity window. Scores are computed on read; nothing here
//! ticks in the background except the idle-timeout sweep.

use crate::config::ValidationConfig;
use crate::error::{ConsensusError, ConsensusResult};
use crate::metrics::ConsensusMetrics;
use crate::now_ms;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vault_consensus_types::ChainRole;

/// Fraction of a chain's weight granted on arrival; the rest accrues with age.
const BASE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub chain: ChainRole,
    /// Unix milliseconds.
    pub confirmed_at: u64,
    pub block_height: Option<u64>,
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Open,
    TimedOut,
}

#[derive(Debug, Clone)]
struct ValidationSession {
    vault_id: String,
    value: String,
    primary_chain: ChainRole,
    requested_at: u64,
    expected_state_hash: Option<String>,
    confirmations: BTreeMap<ChainRole, Confirmation>,
    last_activity: u64,
    status: ValidationStatus,
}

/// What the control surface reports for an open (or failed) validation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationResult {
    pub vault_id: String,
    pub value: String,
    pub primary_chain: ChainRole,
    pub confidence: f64,
    pub confirming_chains: Vec<ChainRole>,
    pub passed: bool,
    pub status: ValidationStatus,
    pub expected_state_hash: Option<String>,
}

pub struct TimeWeightedValidator {
    config: ValidationConfig,
    sessions: RwLock<HashMap<String, ValidationSession>>,
    metrics: Arc<ConsensusMetrics>,
}

impl TimeWeightedValidator {
    pub fn new(config: ValidationConfig, metrics: Arc<ConsensusMetrics>) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Open (or reopen) a validation window for a vault.
    pub async fn initiate_validation(
        &self,
        vault_id: &str,
        value: &str,
        primary_chain: ChainRole,
        request_timestamp: u64,
        expected_state_hash: Option<String>,
    ) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            vault_id.to_string(),
            ValidationSession {
                vault_id: vault_id.to_string(),
                value: value.to_string(),
                primary_chain,
                requested_at: request_timestamp,
                expected_state_hash,
                confirmations: BTreeMap::new(),
                last_activity: now_ms(),
                status: ValidationStatus::Open,
            },
        );
        self.metrics.validations_opened.inc();
        info!(
            "Opened validation window for vault {} (primary {})",
            vault_id, primary_chain
        );
    }

    /// Record one chain's confirmation. The first confirmation per chain
    /// wins: re-confirming cannot reset the age clock.
    pub async fn add_confirmation(
        &self,
        vault_id: &str,
        chain: ChainRole,
        confirmation_timestamp: u64,
        block_height: Option<u64>,
        tx_ref: Option<String>,
    ) -> ConsensusResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(vault_id)
            .filter(|s| s.status == ValidationStatus::Open)
            .ok_or_else(|| ConsensusError::ValidationNotFound(vault_id.to_string()))?;

        session.last_activity = now_ms();
        session
            .confirmations
            .entry(chain)
            .or_insert(Confirmation {
                chain,
                confirmed_at: confirmation_timestamp,
                block_height,
                tx_ref,
            });
        Ok(())
    }

    /// Current score and verdict, or None if no validation was ever opened.
    pub async fn get_validation_result(&self, vault_id: &str) -> Option<ValidationResult> {
        let sessions = self.sessions.read().await;
        sessions
            .get(vault_id)
            .map(|session| self.result_at(session, now_ms()))
    }

    fn result_at(&self, session: &ValidationSession, now: u64) -> ValidationResult {
        let maturity_ms = self.config.confirmation_maturity.as_millis() as f64;
        let mut confidence = 0.0;
        let mut confirming_chains = Vec::new();
        for confirmation in session.confirmations.values() {
            let age_ms = now.saturating_sub(confirmation.confirmed_at) as f64;
            let age_factor = if maturity_ms > 0.0 {
                (age_ms / maturity_ms).min(1.0)
            } else {
                1.0
            };
            confidence += BASE_WEIGHT + (1.0 - BASE_WEIGHT) * age_factor;
            confirming_chains.push(confirmation.chain);
        }
        let passed = session.status == ValidationStatus::Open
            && confirming_chains.len() >= self.config.min_confirming_chains as usize
            && confidence >= self.config.pass_threshold;
        ValidationResult {
            vault_id: session.vault_id.clone(),
            value: session.value.clone(),
            primary_chain: session.primary_chain,
            confidence,
            confirming_chains,
            passed,
            status: session.status,
            expected_state_hash: session.expected_state_hash.clone(),
        }
    }

    /// Fail every open session with no activity inside the timeout window.
    /// Returns the vault ids swept.
    pub async fn sweep_timeouts(&self) -> Vec<String> {
        let now = now_ms();
        let timeout_ms = self.config.session_timeout.as_millis() as u64;
        let mut swept = Vec::new();
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            if session.status == ValidationStatus::Open
                && now.saturating_sub(session.last_activity) > timeout_ms
            {
                warn!(
                    "Validation for vault {} timed out after {}ms of inactivity (requested at {})",
                    session.vault_id, timeout_ms, session.requested_at
                );
                session.status = ValidationStatus::TimedOut;
                self.metrics.validations_timed_out.inc();
                swept.push(session.vault_id.clone());
            }
        }
        swept
    }
}
