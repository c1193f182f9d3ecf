//! JSON-RPC implementations of the chain boundaries
//!
//! SECURITY NOTE:
//! - The reader never touches key material
//! - The writer only borrows the signing wallet from `SecureWallet`

use super::{ChainReader, ChainWriter, ReadError, TransactionCall, WriteError};
use crate::config::ChainDescriptor;
use crate::wallet::SecureWallet;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, SendableTx};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

async fn with_timeout<T, E: std::fmt::Display>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, Option<String>> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Some(e.to_string())),
        Err(_) => Err(None),
    }
}

/// Balance reader backed by each chain's RPC endpoint
#[derive(Debug, Clone)]
pub struct RpcChainReader {
    timeout: Duration,
}

impl RpcChainReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn balance_of(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        holder: Address,
    ) -> Result<U256, ReadError> {
        let provider = ProviderBuilder::new().connect_http(chain.rpc_url.clone());
        let erc20 = IERC20::new(token, &provider);

        with_timeout(self.timeout, async { erc20.balanceOf(holder).call().await })
            .await
            .map_err(|e| match e {
                Some(msg) => ReadError::Rpc(msg),
                None => ReadError::Timeout(self.timeout),
            })
    }
}

/// Transaction writer signing with the agent wallet
#[derive(Debug, Clone)]
pub struct RpcChainWriter {
    wallet: SecureWallet,
    timeout: Duration,
}

impl RpcChainWriter {
    pub fn new(wallet: SecureWallet, timeout: Duration) -> Self {
        Self { wallet, timeout }
    }

    fn map_error(&self, e: Option<String>) -> WriteError {
        match e {
            Some(msg) => WriteError::Rejected(msg),
            None => WriteError::Timeout(self.timeout),
        }
    }
}

#[async_trait]
impl ChainWriter for RpcChainWriter {
    fn sender(&self) -> Address {
        self.wallet.address()
    }

    async fn approve(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, WriteError> {
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.wallet().clone())
            .connect_http(chain.rpc_url.clone());
        let erc20 = IERC20::new(token, &provider);

        let pending = with_timeout(self.timeout, async {
            erc20.approve(spender, amount).send().await
        })
        .await
        .map_err(|e| self.map_error(e))?;

        Ok(*pending.tx_hash())
    }

    async fn send_transaction(
        &self,
        chain: &ChainDescriptor,
        call: &TransactionCall,
    ) -> Result<TxHash, WriteError> {
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.wallet().clone())
            .connect_http(chain.rpc_url.clone());

        let mut tx = TransactionRequest::default()
            .from(self.wallet.address())
            .to(call.to)
            .input(call.data.clone().into())
            .value(call.value);
        if let Some(gas_limit) = call.gas_limit {
            tx = tx.gas_limit(gas_limit);
        }

        // Fill and sign locally; nothing has reached the node yet
        let filled = with_timeout(self.timeout, provider.fill(tx))
            .await
            .map_err(|e| self.map_error(e))?;
        let SendableTx::Envelope(envelope) = filled else {
            return Err(WriteError::Rejected(
                "wallet did not sign the transaction".to_string(),
            ));
        };
        let tx_hash = *envelope.tx_hash();
        let raw = envelope.encoded_2718();

        // From here on the node may hold the transaction
        match tokio::time::timeout(self.timeout, provider.send_raw_transaction(&raw)).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) if e.as_error_resp().is_some() => Err(WriteError::Rejected(e.to_string())),
            Ok(Err(e)) => Err(WriteError::Unconfirmed {
                tx_hash,
                reason: e.to_string(),
            }),
            Err(_) => Err(WriteError::Unconfirmed {
                tx_hash,
                reason: format!("no reply within {:?}", self.timeout),
            }),
        }
    }
}
