//! Decision engine
//!
//! Automated outcome resolution for markets past their closing time. An
//! external language-model service is consulted as an oracle; its output
//! is treated as untrusted and parsed strictly. Anything that is not a
//! well-formed verdict leaves the market closed-but-unresolved, which is
//! always safer than a wrong resolution.

mod engine;
mod llm;

pub use engine::{ResolutionConfig, ResolutionEngine, ResolutionSweepReport};
pub use llm::{LlmConfig, LlmDecisionClient};

use crate::ledger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Verdict values the decision service is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Yes,
    No,
    /// The question cannot be answered; the market stays closed
    Invalid,
}

impl DecisionOutcome {
    /// Map a verdict to the contract's outcome index. Invalid has no
    /// on-chain representation.
    pub fn outcome_index(self) -> Option<u8> {
        match self {
            DecisionOutcome::Yes => Some(ledger::OUTCOME_YES),
            DecisionOutcome::No => Some(ledger::OUTCOME_NO),
            DecisionOutcome::Invalid => None,
        }
    }
}

/// A validated verdict from the decision service.
///
/// Ephemeral by design: only its effect on market status is persisted.
#[derive(Debug, Clone)]
pub struct ResolutionDecision {
    /// The verdict
    pub outcome: DecisionOutcome,
    /// Self-reported confidence, 0-100
    pub confidence: u8,
    /// Free-form reasoning, for logs only
    pub reasoning: String,
    /// Sources cited, for logs only
    pub sources: Vec<String>,
}

/// Decision-service failures
#[derive(Debug, Error)]
pub enum DecisionError {
    /// No API key configured
    #[error("Decision service not configured")]
    NotConfigured,
    /// Transport-level failure
    #[error("Decision service request failed: {0}")]
    Http(String),
    /// The single call did not complete in time
    #[error("Decision service timed out")]
    Timeout,
    /// The service returned no content
    #[error("Decision service returned an empty reply")]
    EmptyReply,
    /// Reply did not contain a parseable JSON verdict
    #[error("Malformed decision reply: {0}")]
    MalformedReply(String),
    /// Verdict was valid JSON but not one of yes/no/invalid
    #[error("Disallowed outcome value: {0}")]
    DisallowedOutcome(String),
}

/// Everything the decision service is shown about a market
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub question: String,
    pub description: String,
    pub category: String,
    pub closing_time: DateTime<Utc>,
    /// Current date, included so the prompt is deterministic given a clock
    pub now: DateTime<Utc>,
}

/// Narrow seam around "ask an LLM, parse text as structured data".
///
/// Implementations must make exactly one service call per invocation and
/// reject non-conforming output rather than attempting lenient recovery.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Request a verdict for one market
    async fn decide(&self, ctx: &DecisionContext) -> Result<ResolutionDecision, DecisionError>;

    /// Whether the provider has credentials to make real calls
    fn is_configured(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_outcome_maps_through_ledger_constants() {
        assert_eq!(DecisionOutcome::Yes.outcome_index(), Some(0));
        assert_eq!(DecisionOutcome::No.outcome_index(), Some(1));
        assert_eq!(DecisionOutcome::Invalid.outcome_index(), None);
    }

    #[test]
    fn test_decision_outcome_agrees_with_label_mapping() {
        assert_eq!(
            DecisionOutcome::Yes.outcome_index(),
            ledger::outcome_index("yes")
        );
        assert_eq!(
            DecisionOutcome::No.outcome_index(),
            ledger::outcome_index("no")
        );
    }
}
