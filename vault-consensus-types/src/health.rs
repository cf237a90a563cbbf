// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain health reporting entities. The transition rules live in the
//! recovery orchestrator; this is the shape they are reported in.

use crate::chain::ChainRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHealth {
    pub chain: ChainRole,
    pub status: HealthStatus,
    /// Errors within the rolling window; decayed periodically.
    pub error_count: u32,
    /// Unix milliseconds.
    pub last_success_at: Option<u64>,
    /// Unix milliseconds.
    pub last_failure_at: Option<u64>,
}

impl ChainHealth {
    pub fn new(chain: ChainRole) -> Self {
        Self {
            chain,
            status: HealthStatus::Healthy,
            error_count: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }
}
