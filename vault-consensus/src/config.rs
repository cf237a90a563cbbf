// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;
use vault_consensus_types::ChainRole;

/// Configuration for one chain binding: where to reach it and how eagerly to
/// poll it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainEndpointConfig {
    /// Prioritized endpoint list. connect() walks this in order.
    pub rpc_urls: Vec<String>,
    /// Address of the vault registry watched on this chain.
    pub vault_registry: String,
    /// Interval between watch polls when caught up.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Maximum native blocks per backfill query.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Interval between backfill sweeps. Minutes, not seconds, to respect
    /// upstream rate limits.
    #[serde(default = "default_backfill_interval")]
    pub backfill_interval: Duration,
    /// Per-call timeout for chain reads.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_block_range() -> u64 {
    1000
}

fn default_backfill_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

/// The three chain bindings. All three roles must be configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainsConfig {
    pub primary: ChainEndpointConfig,
    pub monitor: ChainEndpointConfig,
    pub backup: ChainEndpointConfig,
}

impl ChainsConfig {
    pub fn get(&self, role: ChainRole) -> &ChainEndpointConfig {
        match role {
            ChainRole::Primary => &self.primary,
            ChainRole::Monitor => &self.monitor,
            ChainRole::Backup => &self.backup,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChainRole, &ChainEndpointConfig)> + '_ {
        ChainRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsensusConfig {
    /// A request not decided within this window concludes ConsensusFailed.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Per-vault security level overrides; vaults not listed use
    /// `default-security-level`.
    #[serde(default)]
    pub vault_security_levels: BTreeMap<String, u8>,
    #[serde(default = "default_security_level")]
    pub default_security_level: u8,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_security_level() -> u8 {
    1
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            vault_security_levels: BTreeMap::new(),
            default_security_level: default_security_level(),
        }
    }
}

impl ConsensusConfig {
    pub fn security_level_for(&self, vault_id: &str) -> u8 {
        self.vault_security_levels
            .get(vault_id)
            .copied()
            .unwrap_or(self.default_security_level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValidationConfig {
    /// A confirmation's age bonus saturates at this window.
    #[serde(default = "default_confirmation_maturity")]
    pub confirmation_maturity: Duration,
    /// Combined weighted confidence required to pass.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Distinct confirming chains required to pass.
    #[serde(default = "default_min_confirming_chains")]
    pub min_confirming_chains: u8,
    /// A validation with no activity for this long is marked failed.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: Duration,
}

fn default_confirmation_maturity() -> Duration {
    Duration::from_secs(600)
}

fn default_pass_threshold() -> f64 {
    1.6
}

fn default_min_confirming_chains() -> u8 {
    2
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(3600)
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confirmation_maturity: default_confirmation_maturity(),
            pass_threshold: default_pass_threshold(),
            min_confirming_chains: default_min_confirming_chains(),
            session_timeout: default_session_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Consecutive errors before Healthy -> Degraded.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    /// Consecutive errors before Degraded -> Offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u32,
    /// Consecutive successes before a degraded chain is considered Healthy
    /// again.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,
    /// Interval of the periodic error-count decay tick.
    #[serde(default = "default_decay_interval")]
    pub decay_interval: Duration,
    /// Errors forgiven per decay tick.
    #[serde(default = "default_decay_step")]
    pub decay_step: u32,
}

fn default_degraded_threshold() -> u32 {
    5
}

fn default_offline_threshold() -> u32 {
    10
}

fn default_recovery_threshold() -> u32 {
    3
}

fn default_decay_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_decay_step() -> u32 {
    1
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded_threshold(),
            offline_threshold: default_offline_threshold(),
            recovery_threshold: default_recovery_threshold(),
            decay_interval: default_decay_interval(),
            decay_step: default_decay_step(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    /// The port that the control server listens on.
    pub server_listen_port: u16,
    /// The port for the metrics server.
    pub metrics_port: u16,
    pub chains: ChainsConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("failed to read config {:?}: {}", path.as_ref(), e))?;
        let config: NodeConfig = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("failed to parse config {:?}: {}", path.as_ref(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (role, chain) in self.chains.iter() {
            if chain.rpc_urls.is_empty() {
                return Err(anyhow!("chain {} has no rpc endpoints configured", role));
            }
            for raw in &chain.rpc_urls {
                Url::parse(raw)
                    .map_err(|e| anyhow!("chain {} endpoint {} is not a valid url: {}", role, raw, e))?;
            }
            if chain.vault_registry.is_empty() {
                return Err(anyhow!("chain {} has no vault registry address", role));
            }
            if chain.max_block_range == 0 || chain.max_block_range > 1000 {
                return Err(anyhow!(
                    "chain {} max-block-range must be within 1..=1000, got {}",
                    role,
                    chain.max_block_range
                ));
            }
        }
        if self.health.degraded_threshold == 0
            || self.health.offline_threshold <= self.health.degraded_threshold
        {
            return Err(anyhow!(
                "health thresholds must satisfy 0 < degraded ({}) < offline ({})",
                self.health.degraded_threshold,
                self.health.offline_threshold
            ));
        }
        if self.validation.pass_threshold <= 0.0 {
            return Err(anyhow!("validation pass-threshold must be positive"));
        }
        if self.validation.min_confirming_chains == 0 || self.validation.min_confirming_chains > 3 {
            return Err(anyhow!("validation min-confirming-chains must be within 1..=3"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config(url: &str) -> ChainEndpointConfig {
        ChainEndpointConfig {
            rpc_urls: vec![url.to_string()],
            vault_registry: "0x1::vault_registry".to_string(),
            poll_interval: default_poll_interval(),
            max_block_range: default_max_block_range(),
            backfill_interval: default_backfill_interval(),
            read_timeout: default_read_timeout(),
        }
    }

    fn node_config() -> NodeConfig {
        NodeConfig {
            server_listen_port: 9190,
            metrics_port: 9191,
            chains: ChainsConfig {
                primary: chain_config("http://localhost:8545"),
                monitor: chain_config("http://localhost:9850"),
                backup: chain_config("http://localhost:26657"),
            },
            consensus: ConsensusConfig::default(),
            validation: ValidationConfig::default(),
            health: HealthConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        node_config().validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_endpoints() {
        let mut config = node_config();
        config.chains.backup.rpc_urls.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_url() {
        let mut config = node_config();
        config.chains.monitor.rpc_urls = vec!["not a url".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_block_range() {
        let mut config = node_config();
        config.chains.primary.max_block_range = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_health_thresholds() {
        let mut config = node_config();
        config.health.offline_threshold = config.health.degraded_threshold;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_security_level_lookup() {
        let mut config = node_config();
        config
            .consensus
            .vault_security_levels
            .insert("vault-max".to_string(), 5);
        assert_eq!(config.consensus.security_level_for("vault-max"), 5);
        assert_eq!(config.consensus.security_level_for("vault-other"), 1);
    }

    #[test]
    fn test_defaults_deserialize() {
        let raw = r#"{
            "server-listen-port": 9190,
            "metrics-port": 9191,
            "chains": {
                "primary": { "rpc-urls": ["http://localhost:8545"], "vault-registry": "0x1" },
                "monitor": { "rpc-urls": ["http://localhost:9850"], "vault-registry": "0x2" },
                "backup": { "rpc-urls": ["http://localhost:26657"], "vault-registry": "0x3" }
            }
        }"#;
        let config: NodeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.chains.primary.max_block_range, 1000);
        assert_eq!(config.consensus.request_timeout, Duration::from_secs(30));
        assert_eq!(config.health.degraded_threshold, 5);
        config.validate().unwrap();
    }
}
