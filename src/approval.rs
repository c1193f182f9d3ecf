//! Token approval for the bridge spender
//!
//! Approval is best-effort. The current allowance is not queried; every
//! ERC20 transfer re-submits `approve(spender, amount)` and then waits a
//! fixed settle interval. The wait is not a confirmation. Delivery is
//! confirmed by the completion monitor, not here.

use crate::chain::ChainWriter;
use crate::config::ChainDescriptor;
use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What happened at the approval step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Native currency moves with the transaction value
    NotRequired,
    Submitted { tx_hash: TxHash },
    /// Submission failed; the transfer is attempted anyway
    Failed { error: String },
}

pub struct ApprovalManager {
    writer: Arc<dyn ChainWriter>,
    settle: Duration,
}

impl ApprovalManager {
    pub fn new(writer: Arc<dyn ChainWriter>, settle: Duration) -> Self {
        Self { writer, settle }
    }

    /// Let `spender` pull `amount` of `token` from the agent account
    pub async fn ensure_allowance(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> ApprovalOutcome {
        if token == chain.native_sentinel {
            info!(chain = %chain.key, "Native source token, no approval needed");
            return ApprovalOutcome::NotRequired;
        }

        info!(chain = %chain.key, %token, %spender, %amount, "Submitting approval");
        match self.writer.approve(chain, token, spender, amount).await {
            Ok(tx_hash) => {
                info!(%tx_hash, settle = ?self.settle, "Approval submitted, waiting to settle");
                tokio::time::sleep(self.settle).await;
                ApprovalOutcome::Submitted { tx_hash }
            }
            Err(e) => {
                warn!(chain = %chain.key, error = %e, "Approval failed, continuing without it");
                ApprovalOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
