//! Vault-side delivery callback

use crate::{Error, Result};
use alloy::primitives::{aliases::U24, Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function onFundsReceived(address tokenOut, uint24 fee);
}

/// ABI-encode `onFundsReceived(tokenOut, fee)` for the recipient vault
pub fn encode_on_funds_received(token_out: Address, fee: u32) -> Result<Bytes> {
    if fee >= 1 << 24 {
        return Err(Error::InvalidArgument(format!(
            "Pool fee {} does not fit in uint24",
            fee
        )));
    }
    let call = onFundsReceivedCall {
        tokenOut: token_out,
        fee: U24::from_limbs([u64::from(fee)]),
    };
    Ok(Bytes::from(call.abi_encode()))
}
