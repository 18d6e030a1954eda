//! API handlers

use crate::api::state::AppState;
use crate::ledger::LedgerClient;
use crate::oracle::DecisionProvider;
use crate::store::{Market, MarketStore, StoreError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Body of `GET /oracle/status`
#[derive(Debug, Serialize)]
pub struct OracleStatus {
    /// Automated resolution enabled in config
    pub enabled: bool,
    /// Decision service has credentials
    pub configured: bool,
    /// Markets currently past closing and awaiting resolution
    pub eligible_market_count: usize,
    pub markets: Vec<EligibleMarket>,
}

/// One row of the eligible-market listing
#[derive(Debug, Serialize)]
pub struct EligibleMarket {
    pub id: Uuid,
    pub chain_id: Option<u64>,
    pub question: String,
    pub closing_time: DateTime<Utc>,
}

/// Error body returned by all endpoints
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /oracle/status`
pub async fn oracle_status<S, L, D>(
    State(state): State<AppState<S, L, D>>,
) -> Json<OracleStatus>
where
    S: MarketStore,
    L: LedgerClient,
    D: DecisionProvider,
{
    let eligible = state.engine.eligible_markets().await;

    let markets = eligible
        .iter()
        .map(|m| EligibleMarket {
            id: m.id,
            chain_id: m.chain_id,
            question: m.question.clone(),
            closing_time: m.closing_time,
        })
        .collect();

    Json(OracleStatus {
        enabled: state.oracle_enabled,
        configured: state.engine.is_configured(),
        eligible_market_count: eligible.len(),
        markets,
    })
}

/// `POST /oracle/resolve/:market_id`
///
/// Triggers an immediate out-of-band resolution attempt, serialized behind
/// the resolution sweep guard. Returns the updated market.
pub async fn trigger_resolve<S, L, D>(
    State(state): State<AppState<S, L, D>>,
    Path(market_id): Path<Uuid>,
) -> Result<Json<Market>, (StatusCode, Json<ErrorBody>)>
where
    S: MarketStore,
    L: LedgerClient,
    D: DecisionProvider,
{
    if !state.oracle_enabled {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Automated resolution is disabled",
        ));
    }

    match state.engine.resolve_now(market_id).await {
        Ok(market) => Ok(Json(market)),
        Err(e) => {
            let status = match e.downcast_ref::<StoreError>() {
                Some(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            tracing::warn!(%market_id, error = %e, "Out-of-band resolution failed");
            Err(error_response(status, &format!("{:#}", e)))
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}
