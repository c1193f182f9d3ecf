//! Token symbols and unit conversion
//!
//! Symbols form a closed set. Amounts are always handled in the token's
//! smallest integer unit; decimal strings only appear at the edges (balance
//! reports, decision amounts).

use alloy::primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel address the bridge aggregator uses for a chain's native currency
pub const NATIVE_SENTINEL: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// Supported token symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSymbol {
    Usdc,
    Weth,
    Eth,
}

impl TokenSymbol {
    pub const ALL: [TokenSymbol; 3] = [TokenSymbol::Usdc, TokenSymbol::Weth, TokenSymbol::Eth];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::Usdc => "USDC",
            TokenSymbol::Weth => "WETH",
            TokenSymbol::Eth => "ETH",
        }
    }

    /// Display decimals: 6 for USDC-class stablecoins, 18 for everything else
    pub fn decimals(&self) -> u8 {
        match self {
            TokenSymbol::Usdc => 6,
            TokenSymbol::Weth | TokenSymbol::Eth => 18,
        }
    }

    pub fn is_stablecoin(&self) -> bool {
        matches!(self, TokenSymbol::Usdc)
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenSymbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USDC" => Ok(TokenSymbol::Usdc),
            "WETH" => Ok(TokenSymbol::Weth),
            "ETH" => Ok(TokenSymbol::Eth),
            other => Err(format!("Unknown token symbol: {}", other)),
        }
    }
}

/// Error converting a human-readable amount to integer units
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount '{0}' is not a plain decimal number")]
    Malformed(String),

    #[error("amount '{amount}' has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },

    #[error("amount '{0}' overflows 256 bits")]
    Overflow(String),
}

/// Parse a decimal string into the token's smallest unit
///
/// Accepts `"10"`, `"10.5"`, `".5"` and `"10."`. Signs, exponents and
/// fractional digits beyond `decimals` are rejected rather than rounded.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::Malformed(amount.to_string()));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }

    let digits = format!(
        "{}{:0<width$}",
        if whole.is_empty() { "0" } else { whole },
        fraction,
        width = decimals as usize
    );

    U256::from_str_radix(&digits, 10).map_err(|_| AmountError::Overflow(amount.to_string()))
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
