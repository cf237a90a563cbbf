// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! HTTP control surface. Thin routing over [`ControlRequestHandlerTrait`];
//! all behavior lives in the handler so tests can drive the router with mock
//! components end to end.

use crate::error::ConsensusError;
use crate::metrics::ConsensusMetrics;
use crate::with_metrics;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use vault_consensus_types::{ChainHealth, RecoveryCase, VaultStateSnapshot};

pub mod handler;

use handler::{
    AddConfirmationRequest, ChainStateInput, ControlRequestHandlerTrait,
    InitiateRecoveryRequest, InitiateValidationRequest,
};

use crate::validation::ValidationResult;

pub const HEALTH_PATH: &str = "/health";
pub const SNAPSHOT_PATH: &str = "/snapshots/:vault_id";
pub const VALIDATIONS_PATH: &str = "/validations";
pub const VALIDATION_PATH: &str = "/validations/:vault_id";
pub const CONFIRMATIONS_PATH: &str = "/validations/:vault_id/confirmations";
pub const RECOVERY_PATH: &str = "/recovery";
pub const RECOVERY_STATUS_PATH: &str = "/recovery/:vault_id";
pub const CHAINS_HEALTH_PATH: &str = "/chains/health";
pub const CHAIN_HEALTH_PATH: &str = "/chains/:chain/health";

type HandlerState<H> = (Arc<H>, Arc<ConsensusMetrics>);

pub fn run_server<H: ControlRequestHandlerTrait + 'static>(
    socket_address: &SocketAddr,
    handler: Arc<H>,
    metrics: Arc<ConsensusMetrics>,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address).await.unwrap();
        info!("Control server listening on {}", socket_address);
        axum::serve(listener, make_router(handler, metrics).into_make_service())
            .await
            .unwrap();
    })
}

pub(crate) fn make_router<H: ControlRequestHandlerTrait + 'static>(
    handler: Arc<H>,
    metrics: Arc<ConsensusMetrics>,
) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route(HEALTH_PATH, get(health_check))
        .route(SNAPSHOT_PATH, post(create_snapshot::<H>).get(get_snapshot::<H>))
        .route(VALIDATIONS_PATH, post(initiate_validation::<H>))
        .route(VALIDATION_PATH, get(get_validation::<H>))
        .route(CONFIRMATIONS_PATH, post(add_confirmation::<H>))
        .route(RECOVERY_PATH, post(initiate_recovery::<H>))
        .route(RECOVERY_STATUS_PATH, get(get_recovery_status::<H>))
        .route(CHAINS_HEALTH_PATH, get(get_all_chain_health::<H>))
        .route(CHAIN_HEALTH_PATH, get(get_chain_health::<H>))
        .with_state((handler, metrics))
}

impl axum::response::IntoResponse for ConsensusError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ConsensusError::UnknownChain(_) | ConsensusError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ConsensusError::VaultNotFound(_)
            | ConsensusError::ValidationNotFound(_)
            | ConsensusError::RecoveryNotFound(_) => StatusCode::NOT_FOUND,
            ConsensusError::DuplicateOperation(_) | ConsensusError::RecoveryInProgress(_) => {
                StatusCode::CONFLICT
            }
            ConsensusError::ValidatorRejected { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "type": self.error_type(),
        }));
        (status, body).into_response()
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn create_snapshot<H: ControlRequestHandlerTrait>(
    Path(vault_id): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
    Json(states): Json<BTreeMap<String, ChainStateInput>>,
) -> Result<Json<VaultStateSnapshot>, ConsensusError> {
    let future = async {
        let snapshot = handler.create_snapshot(vault_id, states).await?;
        Ok(Json(snapshot))
    };
    with_metrics!(metrics.clone(), "create_snapshot", future).await
}

async fn get_snapshot<H: ControlRequestHandlerTrait>(
    Path(vault_id): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
) -> Result<Json<VaultStateSnapshot>, ConsensusError> {
    let future = async {
        let snapshot = handler.get_snapshot(vault_id).await?;
        Ok(Json(snapshot))
    };
    with_metrics!(metrics.clone(), "get_snapshot", future).await
}

async fn initiate_validation<H: ControlRequestHandlerTrait>(
    State((handler, metrics)): State<HandlerState<H>>,
    Json(request): Json<InitiateValidationRequest>,
) -> Result<Json<ValidationResult>, ConsensusError> {
    let future = async {
        let result = handler.initiate_validation(request).await?;
        Ok(Json(result))
    };
    with_metrics!(metrics.clone(), "initiate_validation", future).await
}

async fn add_confirmation<H: ControlRequestHandlerTrait>(
    Path(vault_id): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
    Json(request): Json<AddConfirmationRequest>,
) -> Result<Json<ValidationResult>, ConsensusError> {
    let future = async {
        let result = handler.add_confirmation(vault_id, request).await?;
        Ok(Json(result))
    };
    with_metrics!(metrics.clone(), "add_confirmation", future).await
}

async fn get_validation<H: ControlRequestHandlerTrait>(
    Path(vault_id): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
) -> Result<Json<ValidationResult>, ConsensusError> {
    let future = async {
        let result = handler.get_validation(vault_id).await?;
        Ok(Json(result))
    };
    with_metrics!(metrics.clone(), "get_validation", future).await
}

async fn initiate_recovery<H: ControlRequestHandlerTrait>(
    State((handler, metrics)): State<HandlerState<H>>,
    Json(request): Json<InitiateRecoveryRequest>,
) -> Result<Json<RecoveryCase>, ConsensusError> {
    let future = async {
        let case = handler.initiate_recovery(request).await?;
        Ok(Json(case))
    };
    with_metrics!(metrics.clone(), "initiate_recovery", future).await
}

async fn get_recovery_status<H: ControlRequestHandlerTrait>(
    Path(vault_id): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
) -> Result<Json<RecoveryCase>, ConsensusError> {
    let future = async {
        let case = handler.get_recovery_status(vault_id).await?;
        Ok(Json(case))
    };
    with_metrics!(metrics.clone(), "get_recovery_status", future).await
}

async fn get_all_chain_health<H: ControlRequestHandlerTrait>(
    State((handler, metrics)): State<HandlerState<H>>,
) -> Result<Json<Vec<ChainHealth>>, ConsensusError> {
    let future = async {
        let health = handler.get_chain_health(None).await?;
        Ok(Json(health))
    };
    with_metrics!(metrics.clone(), "get_chain_health", future).await
}

async fn get_chain_health<H: ControlRequestHandlerTrait>(
    Path(chain): Path<String>,
    State((handler, metrics)): State<HandlerState<H>>,
) -> Result<Json<Vec<ChainHealth>>, ConsensusError> {
    let future = async {
        let health = handler.get_chain_health(Some(chain)).await?;
        Ok(Json(health))
    };
    with_metrics!(metrics.clone(), "get_chain_health", future).await
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            tracing::info!("Received {} request", $type_);
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    tracing::info!("{} request failed: {:?}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}
