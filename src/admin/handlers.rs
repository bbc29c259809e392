use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::settlement::{
    Bet, BetRequest, DistributionResult, Match, ObserverState, SettlementError, SettlementResult,
};

/// Uniform envelope for every operator-facing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

type Reply<T> = (StatusCode, Json<OperationResult<T>>);

fn status_for(error: &SettlementError) -> StatusCode {
    match error {
        SettlementError::MatchNotFound(_) | SettlementError::NoMatchingBet { .. } => {
            StatusCode::NOT_FOUND
        }
        SettlementError::InvalidBet(_) | SettlementError::InvalidMatch(_) => StatusCode::BAD_REQUEST,
        SettlementError::DistributionPrecondition(_) => StatusCode::CONFLICT,
        SettlementError::Derivation(_) => StatusCode::BAD_GATEWAY,
        SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T>(result: SettlementResult<T>) -> Reply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(OperationResult::ok(data))),
        Err(e) => (status_for(&e), Json(OperationResult::err(e))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub chain_id: u64,
    pub chain_healthy: bool,
    pub observer: ObserverState,
    pub active_matches: usize,
    pub completed_matches: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterMatchRequest {
    pub id: String,
    pub name: String,
    pub teams: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DistributeRequest {
    pub winner: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<OperationResult<SystemStatus>> {
    let ctx = &state.ctx;
    let chain_healthy = ctx.chain_healthy().await;
    let (active_matches, completed_matches) = ctx.store.summary();

    Json(OperationResult::ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if chain_healthy { "operational" } else { "degraded" }.to_string(),
        chain_id: ctx.config.chain.chain_id,
        chain_healthy,
        observer: ctx.observer.state(),
        active_matches,
        completed_matches,
    }))
}

pub async fn list_matches(State(state): State<AdminState>) -> Json<OperationResult<Vec<Match>>> {
    Json(OperationResult::ok(state.ctx.store.list()))
}

pub async fn get_match(State(state): State<AdminState>, Path(id): Path<String>) -> Reply<Match> {
    reply(
        state
            .ctx
            .store
            .get(&id)
            .ok_or(SettlementError::MatchNotFound(id)),
    )
}

pub async fn create_match(
    State(state): State<AdminState>,
    Json(request): Json<RegisterMatchRequest>,
) -> Reply<Match> {
    reply(
        state
            .ctx
            .engine
            .register_match(&request.id, &request.name, &request.teams)
            .await,
    )
}

pub async fn create_bet(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<BetRequest>,
) -> Reply<Bet> {
    reply(state.ctx.engine.record_bet(&id, request).await)
}

pub async fn distribute(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<DistributeRequest>,
) -> Reply<DistributionResult> {
    match state.ctx.engine.distribute(&id, &request.winner).await {
        Ok(result) if result.completed => (StatusCode::OK, Json(OperationResult::ok(result))),
        Ok(result) => {
            let error = format!(
                "{} of {} payouts failed; distribute again to retry them",
                result.failed_count(),
                result.payouts.len()
            );
            let body = OperationResult {
                success: false,
                data: Some(result),
                error: Some(error),
            };
            (StatusCode::OK, Json(body))
        }
        Err(e) => reply(Err(e)),
    }
}
