//! polysettle: Market lifecycle synchronization and settlement engine
//!
//! This library provides the core components for:
//! - Ledger client facade over the on-chain market contract
//! - Local read-model for markets and positions
//! - One-directional reconciliation (ledger always wins)
//! - LLM-backed automated outcome resolution
//! - Exactly-once position settlement
//! - Periodic sweep scheduling with named non-reentrancy guards
//! - Thin HTTP surface for oracle status and manual triggers

pub mod api;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod oracle;
pub mod reconciler;
pub mod scheduler;
pub mod settlement;
pub mod store;
pub mod telemetry;
