//! Balance scanner
//!
//! Reads every ERC20 balance of every vault on every registered chain.
//! Reads run concurrently; each (vault, chain, token) read fails on its own
//! and is recorded as `"0"` plus a [`ReadFailure`], so one bad endpoint never
//! aborts the scan.

use crate::chain::ChainReader;
use crate::config::ChainRegistry;
use crate::tokens::{format_units, TokenSymbol};
use crate::vaults::VaultSet;
use alloy::primitives::Address;
use futures::future::join_all;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A balance query that fell back to zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadFailure {
    pub vault: Address,
    pub chain: String,
    pub symbol: TokenSymbol,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainBalances {
    chain: String,
    tokens: Vec<(TokenSymbol, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VaultBalances {
    vault: Address,
    chains: Vec<ChainBalances>,
}

/// vault → chain key → token symbol → decimal balance
///
/// Serializes as nested JSON objects in registry/input order. Built fresh
/// each cycle and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceReport {
    vaults: Vec<VaultBalances>,
    failures: Vec<ReadFailure>,
}

impl BalanceReport {
    /// Decimal balance for a (vault, chain, token) triple
    pub fn balance(&self, vault: &Address, chain: &str, symbol: TokenSymbol) -> Option<&str> {
        self.vaults
            .iter()
            .find(|v| &v.vault == vault)?
            .chains
            .iter()
            .find(|c| c.chain == chain)?
            .tokens
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, b)| b.as_str())
    }

    /// Vaults covered by the report, in scan order
    pub fn vaults(&self) -> impl Iterator<Item = &Address> {
        self.vaults.iter().map(|v| &v.vault)
    }

    /// Chain keys reported for a vault, in registry order
    pub fn chains_for(&self, vault: &Address) -> Vec<&str> {
        self.vaults
            .iter()
            .find(|v| &v.vault == vault)
            .map(|v| v.chains.iter().map(|c| c.chain.as_str()).collect())
            .unwrap_or_default()
    }

    /// Reads that were substituted with zero
    pub fn failures(&self) -> &[ReadFailure] {
        &self.failures
    }

    /// Whether the reported balance is a zero stand-in for a failed read
    pub fn read_failed(&self, vault: &Address, chain: &str, symbol: TokenSymbol) -> bool {
        self.failures
            .iter()
            .any(|f| &f.vault == vault && f.chain == chain && f.symbol == symbol)
    }
}

struct ChainView<'a>(&'a ChainBalances);

impl Serialize for ChainView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.tokens.len()))?;
        for (symbol, balance) in &self.0.tokens {
            map.serialize_entry(symbol.as_str(), balance)?;
        }
        map.end()
    }
}

struct VaultView<'a>(&'a VaultBalances);

impl Serialize for VaultView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.chains.len()))?;
        for chain in &self.0.chains {
            map.serialize_entry(&chain.chain, &ChainView(chain))?;
        }
        map.end()
    }
}

impl Serialize for BalanceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.vaults.len()))?;
        for vault in &self.vaults {
            map.serialize_entry(&vault.vault.to_string(), &VaultView(vault))?;
        }
        map.end()
    }
}

/// Reads vault balances across all registered chains
pub struct BalanceScanner {
    registry: Arc<ChainRegistry>,
    reader: Arc<dyn ChainReader>,
}

impl BalanceScanner {
    pub fn new(registry: Arc<ChainRegistry>, reader: Arc<dyn ChainReader>) -> Self {
        Self { registry, reader }
    }

    /// Build a report for every vault in the set
    pub async fn scan(&self, vaults: &VaultSet) -> BalanceReport {
        info!(vaults = vaults.len(), "Scanning vault balances");

        let mut units = Vec::new();
        for vault in vaults.iter() {
            for chain in self.registry.chains() {
                for token in chain.erc20_tokens() {
                    units.push((*vault, chain, token));
                }
            }
        }

        let reads = units.into_iter().map(|(vault, chain, token)| async move {
            let result = self.reader.balance_of(chain, token.address, vault).await;
            (vault, chain.key.as_str(), token.symbol, result)
        });
        let results = join_all(reads).await;

        let mut report = BalanceReport::default();
        for (vault, chain_key, symbol, result) in results {
            let balance = match result {
                Ok(raw) => {
                    debug!(%vault, chain = chain_key, %symbol, %raw, "Read balance");
                    format_units(raw, symbol.decimals())
                }
                Err(e) => {
                    warn!(
                        %vault,
                        chain = chain_key,
                        %symbol,
                        error = %e,
                        "Balance read failed, reporting zero"
                    );
                    report.failures.push(ReadFailure {
                        vault,
                        chain: chain_key.to_string(),
                        symbol,
                        error: e.to_string(),
                    });
                    "0".to_string()
                }
            };

            let vi = match report.vaults.iter().position(|v| v.vault == vault) {
                Some(i) => i,
                None => {
                    report.vaults.push(VaultBalances {
                        vault,
                        chains: Vec::new(),
                    });
                    report.vaults.len() - 1
                }
            };
            let chains = &mut report.vaults[vi].chains;
            let ci = match chains.iter().position(|c| c.chain == chain_key) {
                Some(i) => i,
                None => {
                    chains.push(ChainBalances {
                        chain: chain_key.to_string(),
                        tokens: Vec::new(),
                    });
                    chains.len() - 1
                }
            };
            chains[ci].tokens.push((symbol, balance));
        }

        info!(
            vaults = report.vaults.len(),
            failed_reads = report.failures.len(),
            "Balance scan complete"
        );
        report
    }
}
