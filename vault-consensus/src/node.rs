// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node wiring: construct every component explicitly, pass references
//! through constructors, spawn the long-lived tasks, and hand back a
//! cancellation token that tears the whole thing down.

use crate::adapter::{ChainAdapter, JsonRpcChainAdapter};
use crate::audit::{AuditSink, AuditWriter, MemoryAuditSink};
use crate::authorization::ValidatorRegistry;
use crate::config::NodeConfig;
use crate::coordinator::ConsensusCoordinator;
use crate::ingest::{ChainWatcher, EventBus};
use crate::metrics::ConsensusMetrics;
use crate::notify::Notifier;
use crate::recovery::{HealthTracker, RecoveryOrchestrator};
use crate::server::handler::ControlRequestHandler;
use crate::server::run_server;
use crate::snapshot::SnapshotStore;
use crate::validation::TimeWeightedValidator;
use prometheus::{Registry, TextEncoder};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;
use vault_consensus_types::ChainRole;

const EVENT_BUS_CAPACITY: usize = 1024;
const VALIDATION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct NodeHandles {
    pub handles: Vec<JoinHandle<()>>,
    pub cancel: CancellationToken,
}

/// Run the node with the default external collaborators: no authorization
/// validators and the in-memory audit sink.
pub async fn run_node(config: NodeConfig, registry: &Registry) -> anyhow::Result<NodeHandles> {
    run_node_with(
        config,
        registry,
        ValidatorRegistry::empty(),
        Arc::new(MemoryAuditSink::new()),
    )
    .await
}

/// Run the node with injected authorization validators and audit persistence.
pub async fn run_node_with(
    config: NodeConfig,
    registry: &Registry,
    validators: ValidatorRegistry,
    audit_sink: Arc<dyn AuditSink>,
) -> anyhow::Result<NodeHandles> {
    config.validate()?;
    let metrics = Arc::new(ConsensusMetrics::new(registry));
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    // Server uptime tracking task
    let uptime_metrics = metrics.clone();
    let uptime_cancel = cancel.clone();
    let start_time = std::time::Instant::now();
    handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = uptime_cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(10)) => {
                    uptime_metrics
                        .server_uptime_seconds
                        .set(start_time.elapsed().as_secs() as i64);
                }
            }
        }
    }));

    let notifier = Notifier::default();
    let audit = AuditWriter::new(audit_sink, metrics.clone());
    let health = Arc::new(HealthTracker::new(
        config.health.clone(),
        notifier.clone(),
        metrics.clone(),
    ));
    let snapshots = Arc::new(SnapshotStore::new(audit.clone(), metrics.clone()));
    let bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY, metrics.clone()));
    let validator = Arc::new(TimeWeightedValidator::new(
        config.validation.clone(),
        metrics.clone(),
    ));

    let mut adapters: BTreeMap<ChainRole, Arc<dyn ChainAdapter>> = BTreeMap::new();
    for (role, chain_config) in config.chains.iter() {
        let adapter: Arc<dyn ChainAdapter> = Arc::new(JsonRpcChainAdapter::new(
            role,
            chain_config,
            metrics.clone(),
        ));
        adapters.insert(role, adapter);
    }

    let coordinator = Arc::new(ConsensusCoordinator::new(
        adapters.clone(),
        health.clone(),
        snapshots.clone(),
        validators,
        notifier.clone(),
        audit.clone(),
        metrics.clone(),
        config.consensus.clone(),
    ));
    let recovery = Arc::new(RecoveryOrchestrator::new(
        health.clone(),
        adapters.clone(),
        coordinator.clone(),
        notifier.clone(),
        audit,
        metrics.clone(),
    ));

    // One watch loop per chain, each with its own backfill timer.
    for (role, chain_config) in config.chains.iter() {
        let watcher = ChainWatcher::new(
            adapters[&role].clone(),
            bus.clone(),
            health.clone(),
            metrics.clone(),
            chain_config.poll_interval,
            chain_config.backfill_interval,
            chain_config.max_block_range,
        );
        handles.push(tokio::spawn(watcher.run(cancel.clone())));
    }

    // Reactive loops: auto-trigger on observed events, health decay,
    // validation timeout sweep.
    handles.push(tokio::spawn(
        coordinator.clone().run_auto_trigger(bus.clone(), cancel.clone()),
    ));
    handles.push(tokio::spawn(health.clone().run_decay_loop(cancel.clone())));
    let sweep_validator = validator.clone();
    let sweep_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        let mut interval = time::interval(VALIDATION_SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = sweep_cancel.cancelled() => break,
                _ = interval.tick() => {
                    sweep_validator.sweep_timeouts().await;
                }
            }
        }
    }));

    // Control server
    let handler = Arc::new(ControlRequestHandler::new(
        snapshots,
        validator,
        recovery,
        health,
    ));
    let server_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        config.server_listen_port,
    );
    handles.push(run_server(&server_address, handler, metrics));

    // Metrics exposition
    let metrics_address =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), config.metrics_port);
    handles.push(run_metrics_server(metrics_address, registry.clone()));

    info!(
        "Node started: control port {}, metrics port {}",
        config.server_listen_port, config.metrics_port
    );
    Ok(NodeHandles { handles, cancel })
}

fn run_metrics_server(socket_address: SocketAddr, registry: Registry) -> JoinHandle<()> {
    tokio::spawn(async move {
        let router = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || {
                let registry = registry.clone();
                async move {
                    TextEncoder::new()
                        .encode_to_string(&registry.gather())
                        .unwrap_or_default()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind(socket_address).await.unwrap();
        axum::serve(listener, router.into_make_service()).await.unwrap();
    })
}
