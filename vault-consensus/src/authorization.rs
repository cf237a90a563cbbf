// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Authorization validator boundary. The cryptographic mechanisms behind
//! these (threshold signatures, time locks, zero-knowledge proofs, post-
//! quantum checks) are external collaborators; the coordinator only needs
//! their verdicts. Full approval = chain consensus AND every configured
//! validator approving.

use crate::error::{ConsensusError, ConsensusResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use vault_consensus_types::ConsensusRequest;

/// A validator's answer, with an opaque proof for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorDecision {
    pub approved: bool,
    pub proof: Option<String>,
    pub reason: Option<String>,
}

impl ValidatorDecision {
    pub fn approved(proof: impl Into<String>) -> Self {
        Self {
            approved: true,
            proof: Some(proof.into()),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            proof: None,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait AuthorizationValidator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, request: &ConsensusRequest) -> ValidatorDecision;
}

/// Runs every configured validator and reports the first rejection as a
/// structured failure naming the validator. Chain quorum evaluation is
/// independent of this and proceeds regardless.
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn AuthorizationValidator>>,
}

impl ValidatorRegistry {
    pub fn new(validators: Vec<Arc<dyn AuthorizationValidator>>) -> Self {
        Self { validators }
    }

    pub fn empty() -> Self {
        Self { validators: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub async fn validate_all(&self, request: &ConsensusRequest) -> ConsensusResult<Vec<String>> {
        let mut proofs = Vec::new();
        for validator in &self.validators {
            let decision = validator.validate(request).await;
            if !decision.approved {
                return Err(ConsensusError::ValidatorRejected {
                    validator: validator.name().to_string(),
                    reason: decision
                        .reason
                        .unwrap_or_else(|| "no reason given".to_string()),
                });
            }
            info!(
                "Validator {} approved operation {}",
                validator.name(),
                request.operation_id
            );
            if let Some(proof) = decision.proof {
                proofs.push(proof);
            }
        }
        Ok(proofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_consensus_types::OperationType;

    struct FixedValidator {
        name: &'static str,
        decision: ValidatorDecision,
    }

    #[async_trait]
    impl AuthorizationValidator for FixedValidator {
        fn name(&self) -> &str {
            self.name
        }

        async fn validate(&self, _: &ConsensusRequest) -> ValidatorDecision {
            self.decision.clone()
        }
    }

    fn request() -> ConsensusRequest {
        ConsensusRequest {
            operation_id: "op-1".to_string(),
            operation_type: OperationType::Withdraw,
            vault_id: "vault-1".to_string(),
            requester: "tester".to_string(),
            data: serde_json::Value::Null,
            required_chains: 2,
        }
    }

    #[tokio::test]
    async fn test_all_approve() {
        let registry = ValidatorRegistry::new(vec![
            Arc::new(FixedValidator {
                name: "threshold_signature",
                decision: ValidatorDecision::approved("sig-proof"),
            }),
            Arc::new(FixedValidator {
                name: "time_lock",
                decision: ValidatorDecision::approved("lock-proof"),
            }),
        ]);
        let proofs = registry.validate_all(&request()).await.unwrap();
        assert_eq!(proofs, vec!["sig-proof", "lock-proof"]);
    }

    #[tokio::test]
    async fn test_rejection_names_the_validator() {
        let registry = ValidatorRegistry::new(vec![
            Arc::new(FixedValidator {
                name: "threshold_signature",
                decision: ValidatorDecision::approved("sig-proof"),
            }),
            Arc::new(FixedValidator {
                name: "zero_knowledge",
                decision: ValidatorDecision::rejected("proof did not verify"),
            }),
        ]);
        let err = registry.validate_all(&request()).await.unwrap_err();
        match err {
            ConsensusError::ValidatorRejected { validator, reason } => {
                assert_eq!(validator, "zero_knowledge");
                assert_eq!(reason, "proof did not verify");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_registry_approves() {
        let registry = ValidatorRegistry::empty();
        assert!(registry.validate_all(&request()).await.unwrap().is_empty());
    }
}
