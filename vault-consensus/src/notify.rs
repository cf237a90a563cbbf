// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outbound notification broadcast. Dashboards and operator tooling
//! subscribe here; the engine never waits on them.

use tokio::sync::broadcast;
use tracing::debug;
use vault_consensus_types::{ChainHealth, ConsensusVerdict, RecoveryCase};

#[derive(Debug, Clone)]
pub enum Notification {
    ConsensusReached(ConsensusVerdict),
    ConsensusFailed(ConsensusVerdict),
    ChainDegraded(ChainHealth),
    ChainRestored(ChainHealth),
    RecoveryStarted(RecoveryCase),
    RecoveryCompleted(RecoveryCase),
    RecoveryFailed(RecoveryCase),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ConsensusReached(_) => "consensus:reached",
            Notification::ConsensusFailed(_) => "consensus:failed",
            Notification::ChainDegraded(_) => "chain:degraded",
            Notification::ChainRestored(_) => "chain:restored",
            Notification::RecoveryStarted(_) => "recovery:started",
            Notification::RecoveryCompleted(_) => "recovery:completed",
            Notification::RecoveryFailed(_) => "recovery:failed",
        }
    }
}

/// Fan-out channel for notifications. Lagging subscribers drop oldest
/// messages rather than blocking the engine.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        debug!("Publishing notification {}", notification.kind());
        // A send error only means nobody is subscribed right now.
        let _ = self.sender.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_consensus_types::ChainRole;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(Notification::ChainDegraded(ChainHealth::new(
            ChainRole::Monitor,
        )));
        match rx.recv().await.unwrap() {
            Notification::ChainDegraded(health) => assert_eq!(health.chain, ChainRole::Monitor),
            other => panic!("unexpected notification {}", other.kind()),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let notifier = Notifier::new(8);
        notifier.publish(Notification::ChainRestored(ChainHealth::new(
            ChainRole::Backup,
        )));
    }

    #[test]
    fn test_kinds_are_stable() {
        // These strings are part of the external contract; operator tooling
        // matches on them.
        let health = ChainHealth::new(ChainRole::Primary);
        assert_eq!(
            Notification::ChainDegraded(health.clone()).kind(),
            "chain:degraded"
        );
        assert_eq!(Notification::ChainRestored(health).kind(), "chain:restored");
    }
}
