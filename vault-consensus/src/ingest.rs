// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event ingestion: fan N adapter streams into one deduplicated stream.
//!
//! Ordering is per-chain only (each watcher publishes in observation order);
//! nothing is guaranteed across chains. Delivery is at-least-once and
//! per-subscriber independent: one slow subscriber lags or drops its own
//! copies, never anyone else's.

use crate::adapter::ChainAdapter;
use crate::metrics::ConsensusMetrics;
use crate::recovery::HealthTracker;
use crate::retry_with_max_elapsed_time;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vault_consensus_types::VaultEvent;

/// Keys remembered for deduplication. Old keys are forgotten in insertion
/// order once the set is full.
const SEEN_KEY_CAP: usize = 10_000;

struct SeenKeys {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenKeys {
    fn new() -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns false if the key was already present.
    fn insert(&mut self, key: String) -> bool {
        if !self.set.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > SEEN_KEY_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

/// The deduplicated event stream every interested component subscribes to.
pub struct EventBus {
    sender: broadcast::Sender<VaultEvent>,
    seen: Mutex<SeenKeys>,
    metrics: Arc<ConsensusMetrics>,
}

impl EventBus {
    pub fn new(capacity: usize, metrics: Arc<ConsensusMetrics>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            seen: Mutex::new(SeenKeys::new()),
            metrics,
        }
    }

    /// Publish an event. Returns true if it was new, false if it was a
    /// duplicate of an already-delivered `(chain, tx_ref)`.
    pub async fn publish(&self, event: VaultEvent) -> bool {
        self.metrics
            .events_received
            .with_label_values(&[event.chain.as_str()])
            .inc();
        let fresh = self.seen.lock().await.insert(event.event_key());
        if !fresh {
            self.metrics
                .events_deduplicated
                .with_label_values(&[event.chain.as_str()])
                .inc();
            debug!("Dropping duplicate event {}", event.event_key());
            return false;
        }
        // A send error only means nobody is subscribed right now.
        let _ = self.sender.send(event);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a predicate. The forwarding task is per subscriber, so
    /// a slow consumer backpressures only its own queue.
    pub fn subscribe_filtered<F>(&self, predicate: F) -> mpsc::Receiver<VaultEvent>
    where
        F: Fn(&VaultEvent) -> bool + Send + 'static,
    {
        let mut upstream = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok(event) => {
                        if predicate(&event) && tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Filtered subscriber lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}

/// One chain's watch loop: polls the adapter head, fetches new event ranges
/// in capped chunks, and publishes them in observation order. A separate
/// timer re-polls a trailing window as a safety net beneath the live loop.
pub struct ChainWatcher {
    adapter: Arc<dyn ChainAdapter>,
    bus: Arc<EventBus>,
    health: Arc<HealthTracker>,
    metrics: Arc<ConsensusMetrics>,
    poll_interval: Duration,
    backfill_interval: Duration,
    max_block_range: u64,
}

impl ChainWatcher {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        bus: Arc<EventBus>,
        health: Arc<HealthTracker>,
        metrics: Arc<ConsensusMetrics>,
        poll_interval: Duration,
        backfill_interval: Duration,
        max_block_range: u64,
    ) -> Self {
        Self {
            adapter,
            bus,
            health,
            metrics,
            poll_interval,
            backfill_interval,
            max_block_range,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let chain = self.adapter.chain();
        info!("[{}] Starting chain watcher", chain);

        // A failed connect leaves the chain degraded, not the process dead.
        match self.adapter.connect().await {
            Ok(()) => self.health.record_success(chain).await,
            Err(e) => {
                warn!("[{}] Initial connect failed: {}", chain, e);
                self.health.record_failure(chain).await;
            }
        }

        let mut cursor: Option<u64> = None;
        let mut poll = time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backfill = time::interval(self.backfill_interval);
        backfill.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first backfill tick fires immediately; skip it, the live loop
        // is about to cover the same range.
        backfill.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] Chain watcher cancelled", chain);
                    break;
                }
                _ = poll.tick() => {
                    cursor = self.poll_once(cursor).await;
                }
                _ = backfill.tick() => {
                    if let Some(cursor) = cursor {
                        self.backfill_once(cursor).await;
                    }
                }
            }
        }
    }

    /// One live poll: advance from the cursor to the current head. Returns
    /// the new cursor (next block to fetch).
    async fn poll_once(&self, cursor: Option<u64>) -> Option<u64> {
        let chain = self.adapter.chain();
        let head = match self.adapter.head_ref().await {
            Ok(head) => {
                self.health.record_success(chain).await;
                head
            }
            Err(e) => {
                warn!("[{}] Failed to read head: {}", chain, e);
                self.health.record_failure(chain).await;
                return cursor;
            }
        };

        // First observation: start at the head rather than replaying history.
        let mut from = match cursor {
            Some(cursor) => cursor,
            None => {
                debug!("[{}] Watch starting at head {}", chain, head);
                return Some(head.saturating_add(1));
            }
        };

        while from <= head {
            let to = head.min(from.saturating_add(self.max_block_range - 1));
            match self.adapter.poll_events(from, to).await {
                Ok(events) => {
                    self.health.record_success(chain).await;
                    for event in events {
                        self.bus.publish(event).await;
                    }
                    from = to.saturating_add(1);
                }
                Err(e) => {
                    warn!("[{}] Failed to fetch events {}..={}: {}", chain, from, to, e);
                    self.health.record_failure(chain).await;
                    // Leave the cursor where it is; next tick retries.
                    return Some(from);
                }
            }
        }
        Some(from)
    }

    /// Re-poll the trailing window beneath the live loop. Duplicates are
    /// dropped by the bus; anything that survives was genuinely missed.
    async fn backfill_once(&self, cursor: u64) {
        let chain = self.adapter.chain();
        let to = cursor.saturating_sub(1);
        let from = to.saturating_sub(self.max_block_range.saturating_sub(1));
        if to == 0 {
            return;
        }
        let result = retry_with_max_elapsed_time!(
            self.adapter.poll_events(from, to),
            Duration::from_secs(30)
        );
        match result {
            Ok(Ok(events)) => {
                self.health.record_success(chain).await;
                let mut recovered = 0u64;
                for event in events {
                    if self.bus.publish(event).await {
                        recovered += 1;
                    }
                }
                if recovered > 0 {
                    info!(
                        "[{}] Backfill recovered {} missed events in {}..={}",
                        chain, recovered, from, to
                    );
                    self.metrics
                        .backfill_recovered_events
                        .with_label_values(&[chain.as_str()])
                        .inc_by(recovered);
                }
            }
            _ => {
                warn!("[{}] Backfill {}..={} failed after retries", chain, from, to);
                self.health.record_failure(chain).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockChainAdapter;
    use crate::config::HealthConfig;
    use crate::notify::Notifier;
    use vault_consensus_types::{ChainRole, VaultEventKind};

    fn event(chain: ChainRole, tx_ref: &str, block: u64, kind: VaultEventKind) -> VaultEvent {
        VaultEvent {
            vault_id: "vault-1".to_string(),
            chain,
            kind,
            native_block_ref: block,
            tx_ref: tx_ref.to_string(),
            observed_at: 1_000,
            payload: serde_json::Value::Null,
        }
    }

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(64, ConsensusMetrics::new_for_testing()))
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_suppressed() {
        let bus = bus();
        let mut rx = bus.subscribe();

        let e = event(ChainRole::Primary, "0xabc", 10, VaultEventKind::Deposit);
        assert!(bus.publish(e.clone()).await);
        assert!(!bus.publish(e.clone()).await);

        // Exactly one delivery for the duplicated key.
        let received = rx.recv().await.unwrap();
        assert_eq!(received.tx_ref, "0xabc");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_same_tx_ref_on_other_chain_is_distinct() {
        let bus = bus();
        assert!(bus
            .publish(event(ChainRole::Primary, "0xabc", 10, VaultEventKind::Deposit))
            .await);
        assert!(bus
            .publish(event(ChainRole::Monitor, "0xabc", 10, VaultEventKind::Deposit))
            .await);
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let bus = bus();
        let mut rx = bus.subscribe_filtered(|e| e.kind == VaultEventKind::Withdrawal);
        // Give the forwarding task a chance to subscribe before publishing.
        tokio::task::yield_now().await;

        bus.publish(event(ChainRole::Primary, "0x1", 10, VaultEventKind::Deposit))
            .await;
        bus.publish(event(ChainRole::Primary, "0x2", 11, VaultEventKind::Withdrawal))
            .await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, VaultEventKind::Withdrawal);
        assert_eq!(received.tx_ref, "0x2");
    }

    #[tokio::test]
    async fn test_seen_keys_bounded() {
        let mut seen = SeenKeys::new();
        for i in 0..(SEEN_KEY_CAP + 10) {
            assert!(seen.insert(format!("primary:{}", i)));
        }
        assert_eq!(seen.set.len(), SEEN_KEY_CAP);
        // The oldest keys were evicted and would be accepted again.
        assert!(seen.insert("primary:0".to_string()));
    }

    #[tokio::test]
    async fn test_watcher_publishes_new_events_in_order() {
        let adapter = MockChainAdapter::new(ChainRole::Primary);
        adapter.set_head(5);
        adapter.push_event(event(ChainRole::Primary, "0xa", 6, VaultEventKind::Deposit));
        adapter.push_event(event(ChainRole::Primary, "0xb", 7, VaultEventKind::Withdrawal));

        let bus = bus();
        let health = Arc::new(HealthTracker::new(
            HealthConfig::default(),
            Notifier::default(),
            ConsensusMetrics::new_for_testing(),
        ));
        let mut rx = bus.subscribe();

        let watcher = ChainWatcher::new(
            Arc::new(adapter.clone()),
            bus.clone(),
            health,
            ConsensusMetrics::new_for_testing(),
            Duration::from_millis(10),
            Duration::from_secs(300),
            1000,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        // First poll pins the cursor at head+1 (6); then the head advances.
        tokio::time::sleep(Duration::from_millis(30)).await;
        adapter.set_head(7);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.tx_ref, "0xa");
        assert_eq!(second.tx_ref, "0xb");

        cancel.cancel();
        handle.await.unwrap();
    }
}
