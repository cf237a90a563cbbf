// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

// Async JSON-RPC chain adapter over HTTP.
// One instance per configured chain; the active endpoint is whichever entry
// of the prioritized list last answered a connect() probe.

use super::{
    connect_with_fallback, AdapterError, AdapterResult, ChainAdapter, StateRead,
    RATE_LIMIT_BACKOFF_BASE,
};
use crate::config::ChainEndpointConfig;
use crate::metrics::ConsensusMetrics;
use crate::now_ms;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use vault_consensus_types::{ChainRole, ChainState, ConsensusRequest, VaultEvent, VaultEventKind};

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn shared_http_client() -> reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            reqwest::Client::builder()
                .pool_max_idle_per_host(64)
                .tcp_keepalive(Some(Duration::from_secs(30)))
                .connect_timeout(Duration::from_secs(2))
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build reqwest client")
        })
        .clone()
}

pub struct JsonRpcChainAdapter {
    chain: ChainRole,
    http_client: reqwest::Client,
    endpoints: Vec<String>,
    active_endpoint: AtomicUsize,
    vault_registry: String,
    max_block_range: u64,
    read_timeout: Duration,
    request_id: Arc<AtomicU64>,
    metrics: Arc<ConsensusMetrics>,
}

impl JsonRpcChainAdapter {
    pub fn new(chain: ChainRole, config: &ChainEndpointConfig, metrics: Arc<ConsensusMetrics>) -> Self {
        Self {
            chain,
            http_client: shared_http_client(),
            endpoints: config.rpc_urls.clone(),
            active_endpoint: AtomicUsize::new(0),
            vault_registry: config.vault_registry.clone(),
            max_block_range: config.max_block_range,
            read_timeout: config.read_timeout,
            request_id: Arc::new(AtomicU64::new(1)),
            metrics,
        }
    }

    fn active_url(&self) -> &str {
        let index = self
            .active_endpoint
            .load(Ordering::Relaxed)
            .min(self.endpoints.len().saturating_sub(1));
        &self.endpoints[index]
    }

    fn is_transient_transport_error(err: &reqwest::Error) -> bool {
        if err.is_connect() || err.is_timeout() {
            return true;
        }
        let msg = err.to_string().to_lowercase();
        msg.contains("connection closed")
            || msg.contains("connection reset")
            || msg.contains("broken pipe")
            || msg.contains("unexpected eof")
            || msg.contains("incomplete")
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> AdapterResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        };

        let start = Instant::now();
        let result = self.call_inner(&request, method).await;
        self.metrics
            .rpc_queries
            .with_label_values(&[self.chain.as_str(), method])
            .inc();
        self.metrics
            .rpc_queries_latency
            .with_label_values(&[self.chain.as_str(), method])
            .observe(start.elapsed().as_secs_f64());
        if result.is_err() {
            self.metrics
                .rpc_errors
                .with_label_values(&[self.chain.as_str(), method])
                .inc();
        }
        result
    }

    async fn call_inner(&self, request: &JsonRpcRequest, method: &str) -> AdapterResult<Value> {
        let max_attempts: usize = 3;
        let mut last_transport_err: Option<AdapterError> = None;

        for attempt in 0..max_attempts {
            let response = match self
                .http_client
                .post(self.active_url())
                .timeout(self.read_timeout)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    if err.is_timeout() {
                        return Err(AdapterError::Timeout(format!("{}: {}", method, err)));
                    }
                    if attempt + 1 < max_attempts && Self::is_transient_transport_error(&err) {
                        last_transport_err = Some(AdapterError::Rpc(err.to_string()));
                        tracing::warn!(
                            "[{}] transport error calling {} (attempt {}/{}), retrying",
                            self.chain,
                            method,
                            attempt + 1,
                            max_attempts
                        );
                        tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                        continue;
                    }
                    return Err(AdapterError::Rpc(err.to_string()));
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(AdapterError::RateLimited(format!(
                    "{} returned 429",
                    self.active_url()
                )));
            }
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                return Err(AdapterError::Rpc(format!(
                    "HTTP error: {} - {}",
                    status, error_text
                )));
            }

            let rpc_response: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

            if let Some(error) = rpc_response.error {
                // -32005 is the conventional JSON-RPC limit-exceeded code
                if error.code == -32005 || error.message.to_lowercase().contains("rate limit") {
                    return Err(AdapterError::RateLimited(error.message));
                }
                return Err(AdapterError::Rpc(format!(
                    "RPC error {}: {}",
                    error.code, error.message
                )));
            }

            return Ok(rpc_response.result.unwrap_or(Value::Null));
        }

        Err(last_transport_err
            .unwrap_or_else(|| AdapterError::Rpc("RPC call failed after retries".to_string())))
    }

    fn parse_event(&self, value: &Value) -> AdapterResult<VaultEvent> {
        let vault_id = value
            .get("vault_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidResponse("event missing vault_id".to_string()))?;
        let kind: VaultEventKind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidResponse("event missing kind".to_string()))?
            .parse()
            .map_err(AdapterError::InvalidResponse)?;
        let native_block_ref = value
            .get("block_ref")
            .and_then(Value::as_u64)
            .ok_or_else(|| AdapterError::InvalidResponse("event missing block_ref".to_string()))?;
        let tx_ref = value
            .get("tx_ref")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidResponse("event missing tx_ref".to_string()))?;
        Ok(VaultEvent {
            vault_id: vault_id.to_string(),
            chain: self.chain,
            kind,
            native_block_ref,
            tx_ref: tx_ref.to_string(),
            observed_at: now_ms(),
            payload: value.get("payload").cloned().unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl ChainAdapter for JsonRpcChainAdapter {
    fn chain(&self) -> ChainRole {
        self.chain
    }

    async fn connect(&self) -> AdapterResult<()> {
        let index = connect_with_fallback(
            self.chain,
            &self.endpoints,
            RATE_LIMIT_BACKOFF_BASE,
            |endpoint| async move {
                let request = json!({
                    "jsonrpc": "2.0",
                    "method": "vault.head_block",
                    "params": [],
                    "id": 0,
                });
                let response = shared_http_client()
                    .post(&endpoint)
                    .timeout(Duration::from_secs(5))
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| AdapterError::Rpc(e.to_string()))?;
                if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Err(AdapterError::RateLimited(format!("{} returned 429", endpoint)));
                }
                if !response.status().is_success() {
                    return Err(AdapterError::Rpc(format!("HTTP error: {}", response.status())));
                }
                Ok(())
            },
        )
        .await?;
        self.active_endpoint.store(index, Ordering::Relaxed);
        Ok(())
    }

    async fn head_ref(&self) -> AdapterResult<u64> {
        let value = self.call("vault.head_block", vec![]).await?;
        value
            .as_u64()
            .ok_or_else(|| AdapterError::InvalidResponse(format!("head_block: {}", value)))
    }

    async fn poll_events(&self, from_ref: u64, to_ref: u64) -> AdapterResult<Vec<VaultEvent>> {
        // Cap the range regardless of what the caller asked for.
        let to_ref = to_ref.min(from_ref.saturating_add(self.max_block_range - 1));
        let value = self
            .call(
                "vault.events_in_range",
                vec![json!(self.vault_registry), json!(from_ref), json!(to_ref)],
            )
            .await?;
        let raw = value
            .as_array()
            .ok_or_else(|| AdapterError::InvalidResponse("events_in_range: not an array".to_string()))?;
        raw.iter().map(|v| self.parse_event(v)).collect()
    }

    async fn read_state(&self, vault_id: &str) -> StateRead {
        let value = match self
            .call(
                "vault.state",
                vec![json!(self.vault_registry), json!(vault_id)],
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("[{}] read_state({}) failed: {}", self.chain, vault_id, e);
                return StateRead::Unreachable(e.to_string());
            }
        };
        if value.is_null() {
            return StateRead::NotFound;
        }
        let state = value.get("state").and_then(Value::as_str);
        let block_height = value.get("block_height").and_then(Value::as_u64);
        match (state, block_height) {
            (Some(state), Some(block_height)) => {
                StateRead::Known(ChainState::new(self.chain, state, block_height, now_ms()))
            }
            _ => StateRead::Unreachable(format!("malformed vault.state response: {}", value)),
        }
    }

    async fn verify_operation(&self, request: &ConsensusRequest) -> AdapterResult<bool> {
        let value = self
            .call(
                "vault.verify_operation",
                vec![
                    json!(self.vault_registry),
                    json!(request.vault_id),
                    json!(request.operation_type.as_str()),
                    request.data.clone(),
                ],
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| AdapterError::InvalidResponse(format!("verify_operation: {}", value)))
    }
}
