//! Shared application state for API handlers

use crate::ledger::LedgerClient;
use crate::oracle::{DecisionProvider, ResolutionEngine};
use crate::store::MarketStore;
use std::sync::Arc;

/// State handed to every handler.
///
/// Generic over the same seams as the engine so handler tests can run
/// against in-memory doubles.
pub struct AppState<S, L, D> {
    /// Resolution engine for out-of-band attempts
    pub engine: Arc<ResolutionEngine<S, L, D>>,
    /// Read-model store
    pub store: Arc<S>,
    /// Whether automated resolution is enabled at all
    pub oracle_enabled: bool,
}

impl<S, L, D> Clone for AppState<S, L, D> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            store: self.store.clone(),
            oracle_enabled: self.oracle_enabled,
        }
    }
}

impl<S, L, D> AppState<S, L, D>
where
    S: MarketStore,
    L: LedgerClient,
    D: DecisionProvider,
{
    /// Create new handler state
    pub fn new(engine: Arc<ResolutionEngine<S, L, D>>, store: Arc<S>, oracle_enabled: bool) -> Self {
        Self {
            engine,
            store,
            oracle_enabled,
        }
    }
}
