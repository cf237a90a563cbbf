// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry,
};
use std::sync::Arc;

const LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10., 20., 30., 60., 120.,
];

#[derive(Clone, Debug)]
pub struct ConsensusMetrics {
    pub(crate) events_received: IntCounterVec,
    pub(crate) events_deduplicated: IntCounterVec,
    pub(crate) backfill_recovered_events: IntCounterVec,

    pub(crate) consensus_requests: IntCounterVec,
    pub(crate) consensus_reached: IntCounterVec,
    pub(crate) consensus_failed: IntCounterVec,
    pub(crate) verification_latency: HistogramVec,

    pub(crate) snapshots_recorded: IntCounterVec,
    pub(crate) snapshot_invariant_violations: IntCounter,

    pub(crate) validations_opened: IntCounter,
    pub(crate) validations_timed_out: IntCounter,

    pub(crate) chain_health_status: IntGaugeVec,
    pub(crate) chain_error_count: IntGaugeVec,

    pub(crate) recovery_cases_started: IntCounter,
    pub(crate) recovery_cases_completed: IntCounter,
    pub(crate) recovery_cases_failed: IntCounter,

    pub(crate) rpc_queries: IntCounterVec,
    pub(crate) rpc_errors: IntCounterVec,
    pub(crate) rpc_queries_latency: HistogramVec,

    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) audit_write_failures: IntCounter,
    pub(crate) server_uptime_seconds: IntGauge,
}

impl ConsensusMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            events_received: register_int_counter_vec_with_registry!(
                "consensus_events_received",
                "Total number of vault events received, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            events_deduplicated: register_int_counter_vec_with_registry!(
                "consensus_events_deduplicated",
                "Total number of duplicate vault events dropped, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            backfill_recovered_events: register_int_counter_vec_with_registry!(
                "consensus_backfill_recovered_events",
                "Total number of events recovered by the backfill sweep, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            consensus_requests: register_int_counter_vec_with_registry!(
                "consensus_requests_total",
                "Total number of consensus requests processed, by operation type",
                &["operation"],
                registry,
            )
            .unwrap(),
            consensus_reached: register_int_counter_vec_with_registry!(
                "consensus_reached_total",
                "Total number of requests that reached consensus, by operation type",
                &["operation"],
                registry,
            )
            .unwrap(),
            consensus_failed: register_int_counter_vec_with_registry!(
                "consensus_failed_total",
                "Total number of requests that failed consensus, by operation type",
                &["operation"],
                registry,
            )
            .unwrap(),
            verification_latency: register_histogram_vec_with_registry!(
                "consensus_verification_latency",
                "Latency of per-chain verification calls",
                &["chain"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            snapshots_recorded: register_int_counter_vec_with_registry!(
                "consensus_snapshots_recorded",
                "Total number of chain-state observations recorded, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            snapshot_invariant_violations: register_int_counter_with_registry!(
                "consensus_snapshot_invariant_violations",
                "Total number of root hash recomputation mismatches",
                registry,
            )
            .unwrap(),
            validations_opened: register_int_counter_with_registry!(
                "consensus_validations_opened",
                "Total number of time-weighted validation windows opened",
                registry,
            )
            .unwrap(),
            validations_timed_out: register_int_counter_with_registry!(
                "consensus_validations_timed_out",
                "Total number of validation windows failed by the idle timeout",
                registry,
            )
            .unwrap(),
            chain_health_status: register_int_gauge_vec_with_registry!(
                "consensus_chain_health_status",
                "Chain health: 0 healthy, 1 degraded, 2 offline",
                &["chain"],
                registry,
            )
            .unwrap(),
            chain_error_count: register_int_gauge_vec_with_registry!(
                "consensus_chain_error_count",
                "Rolling error count per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            recovery_cases_started: register_int_counter_with_registry!(
                "consensus_recovery_cases_started",
                "Total number of recovery cases opened",
                registry,
            )
            .unwrap(),
            recovery_cases_completed: register_int_counter_with_registry!(
                "consensus_recovery_cases_completed",
                "Total number of recovery cases completed",
                registry,
            )
            .unwrap(),
            recovery_cases_failed: register_int_counter_with_registry!(
                "consensus_recovery_cases_failed",
                "Total number of recovery cases failed",
                registry,
            )
            .unwrap(),
            rpc_queries: register_int_counter_vec_with_registry!(
                "consensus_rpc_queries",
                "Total number of chain RPC queries, by chain and method",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            rpc_errors: register_int_counter_vec_with_registry!(
                "consensus_rpc_errors",
                "Total number of failed chain RPC queries, by chain and method",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            rpc_queries_latency: register_histogram_vec_with_registry!(
                "consensus_rpc_queries_latency",
                "Latency of chain RPC queries, by chain and method",
                &["chain", "method"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            requests_received: register_int_counter_vec_with_registry!(
                "consensus_requests_received",
                "Total number of control-surface requests received, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "consensus_requests_ok",
                "Total number of ok control-surface requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "consensus_err_requests",
                "Total number of erred control-surface requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "consensus_requests_inflight",
                "Number of inflight control-surface requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            audit_write_failures: register_int_counter_with_registry!(
                "consensus_audit_write_failures",
                "Total number of audit writes that failed (consensus proceeded regardless)",
                registry,
            )
            .unwrap(),
            server_uptime_seconds: register_int_gauge_with_registry!(
                "consensus_server_uptime_seconds",
                "Uptime of the node in seconds",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Arc<Self> {
        let registry = Registry::new();
        Arc::new(Self::new(&registry))
    }
}
