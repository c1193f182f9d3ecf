//! Destination delivery monitor
//!
//! Polls the recipient vault's destination-token balance until it rises
//! above the balance observed before submission, or the attempt budget runs
//! out. Only live submissions are monitored.

use crate::chain::ChainReader;
use crate::config::ChainDescriptor;
use crate::tokens::format_units;
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delivery state reported with a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Balance increased on the destination chain
    Confirmed {
        before: String,
        after: String,
        attempts: u32,
    },
    /// Submitted, but no increase seen within the attempt budget
    TimedOut { attempts: u32 },
    /// Monitoring did not run
    Skipped { reason: String },
}

impl DeliveryStatus {
    pub fn skipped(reason: impl Into<String>) -> Self {
        DeliveryStatus::Skipped {
            reason: reason.into(),
        }
    }
}

/// What to watch for one delivery
#[derive(Debug, Clone)]
pub struct DeliveryTarget<'a> {
    pub chain: &'a ChainDescriptor,
    pub token: Address,
    pub decimals: u8,
    pub vault: Address,
    pub before: U256,
}

pub struct CompletionMonitor {
    reader: Arc<dyn ChainReader>,
    interval: Duration,
    max_attempts: u32,
}

impl CompletionMonitor {
    pub fn new(reader: Arc<dyn ChainReader>, interval: Duration, max_attempts: u32) -> Self {
        Self {
            reader,
            interval,
            max_attempts,
        }
    }

    pub async fn wait_for_delivery(&self, target: DeliveryTarget<'_>) -> DeliveryStatus {
        info!(
            chain = %target.chain.key,
            vault = %target.vault,
            token = %target.token,
            before = %target.before,
            max_attempts = self.max_attempts,
            "Monitoring delivery"
        );

        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            match self
                .reader
                .balance_of(target.chain, target.token, target.vault)
                .await
            {
                Ok(balance) if balance > target.before => {
                    info!(attempt, %balance, "Delivery confirmed");
                    return DeliveryStatus::Confirmed {
                        before: format_units(target.before, target.decimals),
                        after: format_units(balance, target.decimals),
                        attempts: attempt,
                    };
                }
                Ok(balance) => debug!(attempt, %balance, "No delivery yet"),
                Err(e) => warn!(attempt, error = %e, "Delivery check failed"),
            }
        }

        warn!(
            attempts = self.max_attempts,
            "Delivery not observed, transaction was submitted but is unconfirmed"
        );
        DeliveryStatus::TimedOut {
            attempts: self.max_attempts,
        }
    }
}
