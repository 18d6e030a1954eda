//! HTTP client for the ledger node
//!
//! Talks to the market contract through a node gateway that exposes
//! contract reads and relays signed transactions. Key management and
//! signing live behind the gateway; this process only submits intents
//! and waits for receipts.

use super::{
    ChainMarket, ChainStatus, LedgerClient, LedgerError, TxHandle, TxReceipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the node client
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Base URL of the node gateway
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Interval between receipt polls while waiting for confirmation
    pub poll_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8545".to_string(),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Ledger client backed by a node HTTP gateway
pub struct NodeLedgerClient {
    config: NodeConfig,
    client: Client,
}

impl NodeLedgerClient {
    /// Create a client with default configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(NodeConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// Create a client with custom configuration
    pub fn with_config(config: NodeConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    async fn submit_tx(&self, path: &str, body: serde_json::Value) -> Result<TxHandle, LedgerError> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 422 || status.as_u16() == 409 {
            let reason = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(reason));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rpc(format!("{} - {}", status, body)));
        }

        let submitted: SubmittedTx = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        Ok(TxHandle(submitted.tx_hash))
    }
}

#[async_trait]
impl LedgerClient for NodeLedgerClient {
    async fn read_market(&self, chain_id: u64) -> Result<ChainMarket, LedgerError> {
        let url = format!("{}/markets/{}", self.config.base_url, chain_id);

        tracing::debug!(url = %url, chain_id, "Reading on-chain market");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rpc(format!("{} - {}", status, body)));
        }

        let raw: NodeMarket = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        Ok(ChainMarket {
            chain_id,
            status: ChainStatus::try_from(raw.status)?,
            resolved_outcome: raw.resolved_outcome,
            end_time: raw.end_time,
            question: raw.question,
            outcomes: raw.outcomes,
        })
    }

    async fn market_count(&self) -> Result<u64, LedgerError> {
        let url = format!("{}/markets/count", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Rpc(response.status().to_string()));
        }

        let count: MarketCount = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        Ok(count.count)
    }

    async fn submit_close(&self, chain_id: u64) -> Result<TxHandle, LedgerError> {
        tracing::info!(chain_id, "Submitting close transaction");
        self.submit_tx("/tx/close", serde_json::json!({ "market_id": chain_id }))
            .await
    }

    async fn submit_resolve(
        &self,
        chain_id: u64,
        outcome_index: u8,
    ) -> Result<TxHandle, LedgerError> {
        tracing::info!(chain_id, outcome_index, "Submitting resolve transaction");
        self.submit_tx(
            "/tx/resolve",
            serde_json::json!({ "market_id": chain_id, "outcome": outcome_index }),
        )
        .await
    }

    async fn wait_for_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<TxReceipt, LedgerError> {
        let url = format!("{}/tx/{}", self.config.base_url, handle.0);
        let poll_interval = self.config.poll_interval;

        let poll = async {
            loop {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| LedgerError::Rpc(e.to_string()))?;

                if response.status().is_success() {
                    let raw: NodeReceipt = response
                        .json()
                        .await
                        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

                    match raw.status.as_str() {
                        "confirmed" => {
                            return Ok(TxReceipt {
                                tx_hash: raw.tx_hash,
                                block_number: raw.block_number.unwrap_or(0),
                            })
                        }
                        "failed" => {
                            return Err(LedgerError::Rejected(
                                raw.reason.unwrap_or_else(|| "unknown".to_string()),
                            ))
                        }
                        // still pending
                        _ => {}
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::ConfirmationTimeout(handle.0.clone())),
        }
    }
}

/// Raw market struct from the node
#[derive(Debug, Deserialize)]
struct NodeMarket {
    /// Status discriminant as stored by the contract
    status: u8,
    /// Winning outcome index once resolved
    resolved_outcome: Option<u8>,
    /// Trading cutoff
    end_time: DateTime<Utc>,
    /// Market question, exposed by gateways that index creation events
    #[serde(default)]
    question: Option<String>,
    /// Outcome labels in contract order
    #[serde(default)]
    outcomes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MarketCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SubmittedTx {
    tx_hash: String,
}

/// Raw receipt from the node
#[derive(Debug, Deserialize)]
struct NodeReceipt {
    tx_hash: String,
    /// "pending", "confirmed" or "failed"
    status: String,
    block_number: Option<u64>,
    reason: Option<String>,
}
