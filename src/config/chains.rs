//! Chain registry
//!
//! The registry is built once at startup from a table of [`ChainSpec`]s and
//! the process environment, then shared read-only by every component.
//!
//! Each chain reads its RPC endpoint and vault address from its own
//! environment variables:
//!
//! ```bash
//! export RPC_ETHEREUM_SEPOLIA="https://eth-sepolia.g.alchemy.com/v2/YOUR_KEY"
//! export VAULT_ETH_SEP="0x..."
//! ```

use crate::tokens::{TokenSymbol, NATIVE_SENTINEL};
use crate::{Error, Result};
use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use url::Url;

/// Token entry in a chain spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSpec {
    pub symbol: TokenSymbol,
    pub address: Address,
}

/// Static description of a chain, before environment lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Short chain key (e.g. "SEP")
    pub key: String,
    pub chain_id: u64,
    pub name: String,
    /// Environment variable holding the RPC URL
    pub rpc_env: String,
    /// Environment variable holding the vault address
    pub vault_env: String,
    #[serde(default = "default_native_sentinel")]
    pub native_sentinel: Address,
    pub tokens: Vec<TokenSpec>,
}

fn default_native_sentinel() -> Address {
    NATIVE_SENTINEL
}

/// A loaded, validated chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainDescriptor {
    pub key: String,
    pub chain_id: u64,
    pub name: String,
    /// Often embeds a provider key, so it is never serialized
    #[serde(skip)]
    pub rpc_url: Url,
    pub native_sentinel: Address,
    pub tokens: Vec<TokenSpec>,
    pub vault: Option<Address>,
}

impl ChainDescriptor {
    /// Contract address for a symbol on this chain
    pub fn token_address(&self, symbol: TokenSymbol) -> Option<Address> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .map(|t| t.address)
    }

    /// Whether the symbol resolves to this chain's native currency
    pub fn is_native(&self, symbol: TokenSymbol) -> bool {
        self.token_address(symbol) == Some(self.native_sentinel)
    }

    /// Tokens with a contract to query, in table order
    ///
    /// The native currency is skipped.
    pub fn erc20_tokens(&self) -> impl Iterator<Item = &TokenSpec> {
        self.tokens
            .iter()
            .filter(move |t| t.address != self.native_sentinel)
    }
}

/// Read-only catalog of the chains under management
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainDescriptor>,
}

impl ChainRegistry {
    /// Validate a set of descriptors
    ///
    /// Keys and chain ids must be unique and at least one chain must carry a
    /// vault address.
    pub fn new(chains: Vec<ChainDescriptor>) -> Result<Self> {
        if chains.is_empty() {
            return Err(Error::Config("No chains configured".to_string()));
        }

        let mut keys = HashSet::new();
        let mut ids = HashSet::new();
        for chain in &chains {
            if chain.key.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Chain {} has an empty key",
                    chain.chain_id
                )));
            }
            if !keys.insert(chain.key.clone()) {
                return Err(Error::Config(format!("Duplicate chain key: {}", chain.key)));
            }
            if !ids.insert(chain.chain_id) {
                return Err(Error::Config(format!(
                    "Duplicate chain id: {}",
                    chain.chain_id
                )));
            }
            let mut symbols = HashSet::new();
            for token in &chain.tokens {
                if !symbols.insert(token.symbol) {
                    return Err(Error::Config(format!(
                        "Token {} listed twice on chain {}",
                        token.symbol, chain.key
                    )));
                }
            }
        }

        if chains.iter().all(|c| c.vault.is_none()) {
            return Err(Error::Config(
                "No vault address configured on any chain".to_string(),
            ));
        }

        Ok(Self { chains })
    }

    /// Load the registry from specs and the process environment
    pub fn from_env(specs: &[ChainSpec]) -> Result<Self> {
        Self::load(specs, |name| std::env::var(name).ok())
    }

    /// Load the registry from specs using an arbitrary variable lookup
    pub fn load(specs: &[ChainSpec], lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut chains = Vec::with_capacity(specs.len());

        for spec in specs {
            let raw_url = lookup(&spec.rpc_env)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Missing env var {} (RPC endpoint for {})",
                        spec.rpc_env, spec.key
                    ))
                })?;
            let rpc_url = Url::parse(raw_url.trim()).map_err(|e| {
                Error::Config(format!("Invalid RPC URL in {}: {}", spec.rpc_env, e))
            })?;

            let vault = match lookup(&spec.vault_env).filter(|v| !v.trim().is_empty()) {
                Some(raw) => Some(Address::from_str(raw.trim()).map_err(|e| {
                    Error::Config(format!(
                        "Invalid vault address in {}: {}",
                        spec.vault_env, e
                    ))
                })?),
                None => {
                    tracing::warn!(chain = %spec.key, env = %spec.vault_env, "No vault configured");
                    None
                }
            };

            tracing::debug!(chain = %spec.key, chain_id = spec.chain_id, "Loaded chain");

            chains.push(ChainDescriptor {
                key: spec.key.clone(),
                chain_id: spec.chain_id,
                name: spec.name.clone(),
                rpc_url,
                native_sentinel: spec.native_sentinel,
                tokens: spec.tokens.clone(),
                vault,
            });
        }

        Self::new(chains)
    }

    /// Chains in registry order
    pub fn chains(&self) -> &[ChainDescriptor] {
        &self.chains
    }

    /// Look up a chain by key
    pub fn get(&self, key: &str) -> Option<&ChainDescriptor> {
        self.chains.iter().find(|c| c.key == key)
    }

    /// The first configured vault in registry order
    pub fn primary_vault(&self) -> Address {
        // `new` guarantees at least one chain has a vault
        self.chains
            .iter()
            .find_map(|c| c.vault)
            .unwrap_or(Address::ZERO)
    }

    /// Chain keys in registry order
    pub fn keys(&self) -> Vec<&str> {
        self.chains.iter().map(|c| c.key.as_str()).collect()
    }
}

/// Default table: the three testnets the agent was built against
pub fn testnet_specs() -> Vec<ChainSpec> {
    vec![
        ChainSpec {
            key: "SEP".to_string(),
            chain_id: 11_155_111,
            name: "Ethereum Sepolia".to_string(),
            rpc_env: "RPC_ETHEREUM_SEPOLIA".to_string(),
            vault_env: "VAULT_ETH_SEP".to_string(),
            native_sentinel: NATIVE_SENTINEL,
            tokens: vec![
                TokenSpec {
                    symbol: TokenSymbol::Usdc,
                    address: address!("1c7d4b196cb0234831493d703c94d5d0fcdfdbbb"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Weth,
                    address: address!("7b79995e5f793a07bc00c21412e50ecae098e7f9"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Eth,
                    address: NATIVE_SENTINEL,
                },
            ],
        },
        ChainSpec {
            key: "BAS".to_string(),
            chain_id: 84_532,
            name: "Base Sepolia".to_string(),
            rpc_env: "RPC_BASE".to_string(),
            vault_env: "VAULT_BASE".to_string(),
            native_sentinel: NATIVE_SENTINEL,
            tokens: vec![
                TokenSpec {
                    symbol: TokenSymbol::Usdc,
                    address: address!("036cbd53842c5426634e7929541ec2318f3dcf7e"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Weth,
                    address: address!("4200000000000000000000000000000000000006"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Eth,
                    address: NATIVE_SENTINEL,
                },
            ],
        },
        ChainSpec {
            key: "ARB".to_string(),
            chain_id: 421_614,
            name: "Arbitrum Sepolia".to_string(),
            rpc_env: "RPC_ARBITRUM".to_string(),
            vault_env: "VAULT_ARBITRUM".to_string(),
            native_sentinel: NATIVE_SENTINEL,
            tokens: vec![
                TokenSpec {
                    symbol: TokenSymbol::Usdc,
                    address: address!("75faf114eafb1bdbe2f0316df893fd58ce46aa4d"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Weth,
                    address: address!("980b6951f8d0c13008b27650c849f89d4dfe318f"),
                },
                TokenSpec {
                    symbol: TokenSymbol::Eth,
                    address: NATIVE_SENTINEL,
                },
            ],
        },
    ]
}
