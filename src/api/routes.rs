use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};
use crate::ledger::LedgerClient;
use crate::oracle::DecisionProvider;
use crate::store::MarketStore;

/// Build the oracle router
pub fn create_router<S, L, D>(state: AppState<S, L, D>) -> Router
where
    S: MarketStore + 'static,
    L: LedgerClient + 'static,
    D: DecisionProvider + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/oracle/status", get(handlers::oracle_status))
        .route("/oracle/resolve/:market_id", post(handlers::trigger_resolve))
        .with_state(state)
        .layer(cors)
}
