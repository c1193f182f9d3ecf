//! Vault registry
//!
//! Externally registered vaults live in an append-only, deduplicated list.
//! Each cycle works on an immutable [`VaultSet`] snapshot instead of reading
//! the shared list directly.

use crate::{Error, Result};
use alloy::primitives::Address;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe, append-only set of registered vault addresses
#[derive(Debug, Clone, Default)]
pub struct VaultRegistry {
    vaults: Arc<RwLock<Vec<Address>>>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vault address, ignoring duplicates
    ///
    /// Returns the number of tracked addresses after the call. The duplicate
    /// check and the append happen under one write lock.
    pub async fn register(&self, raw: &str) -> Result<usize> {
        let address = parse_vault_address(raw)?;

        let mut vaults = self.vaults.write().await;
        if !vaults.contains(&address) {
            tracing::info!(vault = %address, "Registered new vault");
            vaults.push(address);
        } else {
            tracing::debug!(vault = %address, "Vault already registered");
        }
        Ok(vaults.len())
    }

    /// Number of tracked addresses
    pub async fn len(&self) -> usize {
        self.vaults.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vaults.read().await.is_empty()
    }

    /// Copy of the tracked addresses in registration order
    pub async fn snapshot(&self) -> Vec<Address> {
        self.vaults.read().await.clone()
    }
}

fn parse_vault_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("Vault address is empty".to_string()));
    }
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(Error::InvalidArgument(format!(
            "Vault address must be 0x-prefixed and 20 bytes: {}",
            trimmed
        )));
    }
    let address = Address::from_str(trimmed)
        .map_err(|e| Error::InvalidArgument(format!("Invalid vault address: {}", e)))?;
    if address == Address::ZERO {
        return Err(Error::InvalidArgument(
            "Vault address cannot be the zero address".to_string(),
        ));
    }
    Ok(address)
}

/// The vaults scanned in one cycle: the primary vault followed by the
/// registered ones, deduplicated, in first-seen order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VaultSet(Vec<Address>);

impl VaultSet {
    pub fn new(primary: Address, registered: impl IntoIterator<Item = Address>) -> Self {
        Self::from_addresses(std::iter::once(primary).chain(registered))
    }

    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut vaults: Vec<Address> = Vec::new();
        for address in addresses {
            if address != Address::ZERO && !vaults.contains(&address) {
                vaults.push(address);
            }
        }
        Self(vaults)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = VaultRegistry::new();
        assert_eq!(registry.register(A).await.unwrap(), 1);
        assert_eq!(registry.register(A).await.unwrap(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_dedups_across_case() {
        let registry = VaultRegistry::new();
        let mixed = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let lower = mixed.to_lowercase();
        registry.register(mixed).await.unwrap();
        assert_eq!(registry.register(&lower).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let registry = VaultRegistry::new();
        for bad in ["", "   ", "0x1234", "1111111111111111111111111111111111111111", "0xzz11111111111111111111111111111111111111"] {
            let err = registry.register(bad).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{bad}");
        }
        let zero = format!("0x{}", "0".repeat(40));
        assert!(registry.register(&zero).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let registry = VaultRegistry::new();
        let first = registry.clone();
        let second = registry.clone();

        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.register(A).await }),
            tokio::spawn(async move { second.register(B).await }),
        );
        assert!(a.unwrap().is_ok());
        assert!(b.unwrap().is_ok());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_registrations_keep_one() {
        let registry = VaultRegistry::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = registry.clone();
                tokio::spawn(async move { r.register(A).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[test]
    fn test_vault_set_dedups_and_keeps_order() {
        let a = Address::from_str(A).unwrap();
        let b = Address::from_str(B).unwrap();
        let set = VaultSet::new(a, vec![b, a, b]);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(set.len(), 2);
    }
}
