// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scripted chain adapter for tests. Clones share state, so a test can keep
//! a handle and reprogram responses while the engine holds the adapter.

use super::{AdapterResult, ChainAdapter, StateRead};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vault_consensus_types::{ChainRole, ConsensusRequest, VaultEvent};

#[derive(Clone)]
pub struct MockChainAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    chain: ChainRole,
    connect_result: Mutex<AdapterResult<()>>,
    head: AtomicU64,
    events: Mutex<Vec<VaultEvent>>,
    states: Mutex<HashMap<String, StateRead>>,
    verify_responses: Mutex<HashMap<String, AdapterResult<bool>>>,
    default_verify: Mutex<AdapterResult<bool>>,
    verify_delay: Mutex<Option<Duration>>,
    verify_calls: AtomicU32,
}

impl MockChainAdapter {
    pub fn new(chain: ChainRole) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain,
                connect_result: Mutex::new(Ok(())),
                head: AtomicU64::new(0),
                events: Mutex::new(Vec::new()),
                states: Mutex::new(HashMap::new()),
                verify_responses: Mutex::new(HashMap::new()),
                default_verify: Mutex::new(Ok(true)),
                verify_delay: Mutex::new(None),
                verify_calls: AtomicU32::new(0),
            }),
        }
    }

    pub fn set_connect_result(&self, result: AdapterResult<()>) {
        *self.inner.connect_result.lock().unwrap() = result;
    }

    pub fn set_head(&self, head: u64) {
        self.inner.head.store(head, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: VaultEvent) {
        self.inner.events.lock().unwrap().push(event);
    }

    pub fn set_state(&self, vault_id: &str, state: StateRead) {
        self.inner
            .states
            .lock()
            .unwrap()
            .insert(vault_id.to_string(), state);
    }

    /// Script the verification answer for one operation id.
    pub fn add_verify_response(&self, operation_id: &str, response: AdapterResult<bool>) {
        self.inner
            .verify_responses
            .lock()
            .unwrap()
            .insert(operation_id.to_string(), response);
    }

    /// Answer for operations without a scripted response.
    pub fn set_default_verify(&self, response: AdapterResult<bool>) {
        *self.inner.default_verify.lock().unwrap() = response;
    }

    pub fn set_verify_delay(&self, delay: Option<Duration>) {
        *self.inner.verify_delay.lock().unwrap() = delay;
    }

    pub fn verify_call_count(&self) -> u32 {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    fn chain(&self) -> ChainRole {
        self.inner.chain
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.inner.connect_result.lock().unwrap().clone()
    }

    async fn head_ref(&self) -> AdapterResult<u64> {
        Ok(self.inner.head.load(Ordering::SeqCst))
    }

    async fn poll_events(&self, from_ref: u64, to_ref: u64) -> AdapterResult<Vec<VaultEvent>> {
        let events = self.inner.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| e.native_block_ref >= from_ref && e.native_block_ref <= to_ref)
            .cloned()
            .collect())
    }

    async fn read_state(&self, vault_id: &str) -> StateRead {
        self.inner
            .states
            .lock()
            .unwrap()
            .get(vault_id)
            .cloned()
            .unwrap_or(StateRead::NotFound)
    }

    async fn verify_operation(&self, request: &ConsensusRequest) -> AdapterResult<bool> {
        self.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.verify_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(response) = self
            .inner
            .verify_responses
            .lock()
            .unwrap()
            .get(&request.operation_id)
        {
            return response.clone();
        }
        self.inner.default_verify.lock().unwrap().clone()
    }
}
