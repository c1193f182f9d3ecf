//! Bridge route quoting
//!
//! A [`RouteQuoter`] turns a transfer request into a ready-to-send
//! transaction descriptor, or a [`NoRoute`] explaining why it could not.
//! Quotes are trusted as far as their payload goes; a quote without a usable
//! call target and call data is never returned.

mod callback;
mod lifi;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;

pub use callback::encode_on_funds_received;
pub use lifi::LifiQuoter;

/// No usable route for the request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no route: {reason}")]
pub struct NoRoute {
    pub reason: String,
}

impl NoRoute {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Contract call the bridge performs on the destination chain after delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationCall {
    pub target: Address,
    pub data: Bytes,
    pub gas_limit: u64,
}

/// Parameters for a single transfer quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteRequest {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Address,
    pub to_token: Address,
    /// Amount in the source token's smallest unit
    pub amount: U256,
    pub sender: Address,
    pub recipient: Address,
    pub destination_call: Option<DestinationCall>,
}

/// A priced, executable route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Call target on the source chain
    pub to: Address,
    pub data: Bytes,
    /// Native value to attach
    pub value: U256,
    pub gas_limit: Option<u64>,
    /// Bridge or exchange executing the route
    pub tool: String,
    /// Estimated output in the destination token's smallest unit
    pub to_amount: Option<String>,
    /// Total estimated fees in USD
    pub fee_usd: Option<String>,
    /// Address that must be allowed to pull the source token
    pub spender: Address,
}

#[async_trait]
pub trait RouteQuoter: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, NoRoute>;

    /// Quoter name for logging
    fn name(&self) -> &'static str;
}
