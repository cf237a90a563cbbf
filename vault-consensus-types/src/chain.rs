// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain roles. The engine reconciles exactly three ledgers; each is bound
//! to a role at startup and addressed by role everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three ledger roles the engine reconciles across.
///
/// Ordering is part of the hashing contract: roots and proofs iterate chains
/// in `Primary < Monitor < Backup` order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainRole {
    Primary,
    Monitor,
    Backup,
}

impl ChainRole {
    pub const ALL: [ChainRole; 3] = [ChainRole::Primary, ChainRole::Monitor, ChainRole::Backup];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRole::Primary => "primary",
            ChainRole::Monitor => "monitor",
            ChainRole::Backup => "backup",
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain identifier: {0}")]
pub struct UnknownChain(pub String);

impl FromStr for ChainRole {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ChainRole::Primary),
            "monitor" => Ok(ChainRole::Monitor),
            "backup" => Ok(ChainRole::Backup),
            other => Err(UnknownChain(other.to_string())),
        }
    }
}
