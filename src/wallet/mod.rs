//! Agent wallet
//!
//! Holds the agent's signing key. The key never leaves this module; other
//! components only see the public address and an alloy `EthereumWallet`.

mod signer;

pub use signer::SecureWallet;
