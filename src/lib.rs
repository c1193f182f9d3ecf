//! Cross-chain Vault Rebalancer
//!
//! An agent that keeps liquidity balanced across vaults on several chains:
//! - Scan vault token balances on every registered chain
//! - Ask a pluggable decision policy whether funds should move
//! - Quote, approve and submit the transfer through the LI.FI aggregator
//! - Fall back to a clearly flagged simulation when no live route exists
//!
//! # Security Model
//!
//! - Decision policy output is untrusted and validated before use
//! - Private keys never leave the wallet module
//! - Every cycle is appended to a JSONL audit trail

pub mod approval;
pub mod audit;
pub mod bridge;
pub mod chain;
pub mod config;
pub mod decision;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod scanner;
pub mod service;
pub mod tokens;
pub mod vaults;
pub mod wallet;

mod error;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ChainRegistry, Config, FallbackMode};
pub use decision::{DecisionOrigin, RebalanceDecision};
pub use error::{Error, Result};
pub use executor::ExecutionResult;
pub use orchestrator::RebalanceOrchestrator;
pub use service::{AgentService, CycleResponse};
pub use vaults::{VaultRegistry, VaultSet};
