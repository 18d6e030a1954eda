//! Prometheus metrics

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Reconciliation sweeps completed
    ReconcileSweeps,
    /// Markets merged from chain truth
    MarketsSynced,
    /// Per-market sync failures
    SyncFailures,
    /// Resolution sweeps completed
    ResolutionSweeps,
    /// Markets resolved on chain by the decision engine
    MarketsResolved,
    /// Decision-service failures (timeout, malformed reply, invalid verdict)
    DecisionFailures,
    /// Positions settled
    PositionsSettled,
    /// Ledger events applied from the subscription
    EventsApplied,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::ReconcileSweeps => "polysettle_reconcile_sweeps_total",
            CounterMetric::MarketsSynced => "polysettle_markets_synced_total",
            CounterMetric::SyncFailures => "polysettle_sync_failures_total",
            CounterMetric::ResolutionSweeps => "polysettle_resolution_sweeps_total",
            CounterMetric::MarketsResolved => "polysettle_markets_resolved_total",
            CounterMetric::DecisionFailures => "polysettle_decision_failures_total",
            CounterMetric::PositionsSettled => "polysettle_positions_settled_total",
            CounterMetric::EventsApplied => "polysettle_events_applied_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Markets past closing time awaiting resolution
    EligibleMarkets,
    /// Markets not yet in a terminal status
    OpenMarkets,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::EligibleMarkets => "polysettle_eligible_markets",
            GaugeMetric::OpenMarkets => "polysettle_open_markets",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, by: u64) {
    metrics::counter!(metric.name()).increment(by);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}
