// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Recovery cases: the audit record of a chain-failover attempt.

use crate::chain::ChainRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStatus {
    InProgress,
    Completed,
    Failed,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::InProgress => "in_progress",
            RecoveryStatus::Completed => "completed",
            RecoveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecoveryStatus::InProgress)
    }
}

/// One attempted action within a recovery case. Appended in order; failures
/// are recorded, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Unix milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCase {
    pub vault_id: String,
    pub primary_chain: ChainRole,
    pub fallback_chain: ChainRole,
    pub trigger: String,
    pub steps: Vec<RecoveryStep>,
    pub status: RecoveryStatus,
    /// Unix milliseconds.
    pub opened_at: u64,
}

impl RecoveryCase {
    pub fn new(
        vault_id: impl Into<String>,
        primary_chain: ChainRole,
        fallback_chain: ChainRole,
        trigger: impl Into<String>,
        opened_at: u64,
    ) -> Self {
        Self {
            vault_id: vault_id.into(),
            primary_chain,
            fallback_chain,
            trigger: trigger.into(),
            steps: Vec::new(),
            status: RecoveryStatus::InProgress,
            opened_at,
        }
    }

    pub fn record_step(
        &mut self,
        action: impl Into<String>,
        success: bool,
        detail: Option<String>,
        timestamp: u64,
    ) {
        self.steps.push(RecoveryStep {
            action: action.into(),
            success,
            detail,
            timestamp,
        });
    }
}
