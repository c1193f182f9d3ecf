//! Chain read/write boundaries
//!
//! The pipeline talks to chains only through these two traits, so scanning,
//! approval, execution and monitoring can be exercised without a node.

mod rpc;

use crate::config::ChainDescriptor;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub use rpc::{RpcChainReader, RpcChainWriter};

/// A read-only balance query failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    #[error("balance query timed out after {0:?}")]
    Timeout(Duration),

    #[error("balance query failed: {0}")]
    Rpc(String),
}

/// A write did not complete
///
/// `Rejected` and `Timeout` mean nothing left the process or the node
/// refused it. `Unconfirmed` means the signed transaction was handed to the
/// node and may still land.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    #[error("transaction rejected before broadcast: {0}")]
    Rejected(String),

    #[error("transaction preparation timed out after {0:?}")]
    Timeout(Duration),

    #[error("transaction {tx_hash} sent but not acknowledged: {reason}")]
    Unconfirmed { tx_hash: TxHash, reason: String },
}

/// Arbitrary call submitted by the agent account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

/// Read-only access to token balances
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Balance of `holder` in the token's smallest unit
    async fn balance_of(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        holder: Address,
    ) -> Result<U256, ReadError>;
}

/// Source-side writes signed by the agent's key
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Address transactions are sent from
    fn sender(&self) -> Address;

    /// Submit `approve(spender, amount)` on `token`
    async fn approve(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, WriteError>;

    /// Submit an arbitrary transaction and return its hash once broadcast
    async fn send_transaction(
        &self,
        chain: &ChainDescriptor,
        call: &TransactionCall,
    ) -> Result<TxHash, WriteError>;
}
