//! Decision policies and decision validation
//!
//! A [`DecisionPolicy`] looks at the balance report and answers with
//! free-form JSON. Nothing in that payload is trusted: [`validate_decision`]
//! checks every field against the chain registry and the cycle's vault set
//! and either produces an executable [`SwapPlan`] or coerces the answer to a
//! wait with a diagnostic reason.
//!
//! Wire shape of a policy answer:
//!
//! ```json
//! {
//!   "action": "SWAP",
//!   "fromChain": "BAS",
//!   "targetChain": "SEP",
//!   "sourceToken": "USDC",
//!   "targetToken": "USDC",
//!   "amount": "10",
//!   "reason": "description",
//!   "vaultAddress": "0x..."
//! }
//! ```

mod llm;
mod threshold;

use crate::config::{ChainRegistry, DecisionSettings};
use crate::scanner::BalanceReport;
use crate::tokens::{parse_units, TokenSymbol};
use crate::vaults::VaultSet;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use llm::ChatCompletionPolicy;
pub use threshold::ThresholdPolicy;

/// Reason attached when the policy could not be consulted
pub const DECISION_UNAVAILABLE: &str = "decision unavailable";

/// The policy call itself failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecisionError {
    #[error("decision request timed out after {0:?}")]
    Timeout(Duration),

    #[error("decision request failed: {0}")]
    Http(String),

    #[error("malformed decision response: {0}")]
    Malformed(String),
}

/// Source of rebalance decisions
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    /// Answer with an untrusted decision payload
    async fn decide(&self, report: &BalanceReport, capital_usd: f64)
        -> std::result::Result<Value, DecisionError>;

    /// Policy name for logging
    fn name(&self) -> &'static str;
}

/// Build the configured policy
pub fn build_policy(
    settings: &DecisionSettings,
    registry: Arc<ChainRegistry>,
) -> Result<Arc<dyn DecisionPolicy>> {
    match settings {
        DecisionSettings::Chat {
            base_url,
            model,
            api_key_env,
            timeout_ms,
            rules,
        } => {
            let api_key = std::env::var(api_key_env)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("Missing env var {}", api_key_env)))?;
            let policy = ChatCompletionPolicy::new(
                base_url,
                model,
                SecretString::from(api_key),
                Duration::from_millis(*timeout_ms),
                rules.clone(),
                registry,
            )?;
            Ok(Arc::new(policy))
        }
        DecisionSettings::Threshold { rules } => {
            Ok(Arc::new(ThresholdPolicy::new(rules.clone(), registry)?))
        }
    }
}

/// A rebalance decision as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum RebalanceDecision {
    Wait {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Swap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vault_address: Option<Address>,
        from_chain: String,
        target_chain: String,
        source_token: TokenSymbol,
        target_token: TokenSymbol,
        amount: String,
        reason: String,
    },
}

impl RebalanceDecision {
    pub fn wait(reason: impl Into<String>) -> Self {
        RebalanceDecision::Wait {
            reason: reason.into(),
        }
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, RebalanceDecision::Wait { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            RebalanceDecision::Wait { reason } | RebalanceDecision::Swap { reason, .. } => reason,
        }
    }
}

/// Where the final decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    /// Taken from the policy as-is
    Policy,
    /// The policy answered but the answer was rejected
    Coerced,
    /// The policy could not be consulted
    Unavailable,
}

/// A swap that passed validation, with everything resolved for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub from_chain: String,
    pub target_chain: String,
    pub source_token: TokenSymbol,
    pub target_token: TokenSymbol,
    /// Human amount as decided
    pub amount: String,
    /// Amount in the source token's smallest unit
    pub amount_raw: U256,
    /// Vault receiving the funds on the target chain
    pub recipient: Address,
    /// Vault named by the policy, if any; reporting only
    pub vault_address: Option<Address>,
    pub reason: String,
}

impl SwapPlan {
    pub fn decision(&self) -> RebalanceDecision {
        RebalanceDecision::Swap {
            vault_address: self.vault_address,
            from_chain: self.from_chain.clone(),
            target_chain: self.target_chain.clone(),
            source_token: self.source_token,
            target_token: self.target_token,
            amount: self.amount.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// Outcome of validating a policy answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedDecision {
    Wait {
        reason: String,
        origin: DecisionOrigin,
    },
    Swap(SwapPlan),
}

impl ValidatedDecision {
    pub fn unavailable() -> Self {
        ValidatedDecision::Wait {
            reason: DECISION_UNAVAILABLE.to_string(),
            origin: DecisionOrigin::Unavailable,
        }
    }

    fn coerced(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Decision rejected, waiting instead");
        ValidatedDecision::Wait {
            reason: format!("invalid decision: {}", reason),
            origin: DecisionOrigin::Coerced,
        }
    }

    pub fn decision(&self) -> RebalanceDecision {
        match self {
            ValidatedDecision::Wait { reason, .. } => RebalanceDecision::wait(reason.clone()),
            ValidatedDecision::Swap(plan) => plan.decision(),
        }
    }

    pub fn origin(&self) -> DecisionOrigin {
        match self {
            ValidatedDecision::Wait { origin, .. } => *origin,
            ValidatedDecision::Swap(_) => DecisionOrigin::Policy,
        }
    }
}

fn text_field<'a>(raw: &'a Value, name: &str) -> Option<&'a str> {
    raw.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Check an untrusted policy answer against the registry and vault set
pub fn validate_decision(
    raw: &Value,
    registry: &ChainRegistry,
    vaults: &VaultSet,
) -> ValidatedDecision {
    if !raw.is_object() {
        return ValidatedDecision::coerced("decision is not a JSON object");
    }

    let reason = text_field(raw, "reason").unwrap_or_default().to_string();

    let action = match text_field(raw, "action") {
        Some(action) => action.to_uppercase(),
        None => return ValidatedDecision::coerced("decision has no action"),
    };
    match action.as_str() {
        "WAIT" => {
            let reason = if reason.is_empty() {
                "policy chose to wait".to_string()
            } else {
                reason
            };
            return ValidatedDecision::Wait {
                reason,
                origin: DecisionOrigin::Policy,
            };
        }
        "SWAP" => {}
        other => return ValidatedDecision::coerced(format!("unknown action '{}'", other)),
    }

    let Some(from_key) = text_field(raw, "fromChain") else {
        return ValidatedDecision::coerced("missing fromChain");
    };
    let Some(target_key) = text_field(raw, "targetChain") else {
        return ValidatedDecision::coerced("missing targetChain");
    };
    let Some(from_chain) = registry.get(from_key) else {
        return ValidatedDecision::coerced(format!("unknown chain '{}'", from_key));
    };
    let Some(target_chain) = registry.get(target_key) else {
        return ValidatedDecision::coerced(format!("unknown chain '{}'", target_key));
    };

    let source_token = match text_field(raw, "sourceToken").map(TokenSymbol::from_str) {
        Some(Ok(symbol)) => symbol,
        Some(Err(e)) => return ValidatedDecision::coerced(e),
        None => return ValidatedDecision::coerced("missing sourceToken"),
    };
    let target_token = match text_field(raw, "targetToken").map(TokenSymbol::from_str) {
        Some(Ok(symbol)) => symbol,
        Some(Err(e)) => return ValidatedDecision::coerced(e),
        None => return ValidatedDecision::coerced("missing targetToken"),
    };
    if from_chain.token_address(source_token).is_none() {
        return ValidatedDecision::coerced(format!(
            "token {} is not listed on {}",
            source_token, from_chain.key
        ));
    }
    if target_chain.token_address(target_token).is_none() {
        return ValidatedDecision::coerced(format!(
            "token {} is not listed on {}",
            target_token, target_chain.key
        ));
    }

    if from_chain.key == target_chain.key && source_token == target_token {
        return ValidatedDecision::coerced(format!(
            "swap {} {} -> {} {} moves nothing",
            from_chain.key, source_token, target_chain.key, target_token
        ));
    }

    // Policies sometimes answer with a bare number
    let amount = match raw.get("amount") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return ValidatedDecision::coerced("missing amount"),
    };
    let amount_raw = match parse_units(&amount, source_token.decimals()) {
        Ok(raw) if !raw.is_zero() => raw,
        Ok(_) => return ValidatedDecision::coerced("amount must be positive"),
        Err(e) => return ValidatedDecision::coerced(e.to_string()),
    };

    let vault_address = match text_field(raw, "vaultAddress") {
        Some(s) => match Address::from_str(s) {
            Ok(address) if vaults.contains(&address) => Some(address),
            Ok(address) => {
                return ValidatedDecision::coerced(format!("vault {} is not managed", address))
            }
            Err(_) => return ValidatedDecision::coerced(format!("malformed vault address '{}'", s)),
        },
        None => None,
    };

    // Vaults are deployed per chain; the named vault only selects which
    // managed vault the decision is about.
    let recipient = match target_chain.vault {
        Some(address) => address,
        None => {
            return ValidatedDecision::coerced(format!(
                "no vault configured on {}",
                target_chain.key
            ))
        }
    };

    ValidatedDecision::Swap(SwapPlan {
        from_chain: from_chain.key.clone(),
        target_chain: target_chain.key.clone(),
        source_token,
        target_token,
        amount,
        amount_raw,
        recipient,
        vault_address,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{registry_two_chains, VAULT_A, VAULT_B};
    use serde_json::json;

    fn swap(from: &str, to: &str, source: &str, target: &str, amount: Value) -> Value {
        json!({
            "action": "SWAP",
            "fromChain": from,
            "targetChain": to,
            "sourceToken": source,
            "targetToken": target,
            "amount": amount,
            "reason": "rebalance"
        })
    }

    fn assert_coerced(result: ValidatedDecision) {
        match result {
            ValidatedDecision::Wait { reason, origin } => {
                assert_eq!(origin, DecisionOrigin::Coerced);
                assert!(!reason.is_empty());
            }
            other => panic!("expected coerced wait, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_swap_resolves_plan() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);
        let raw = swap("A", "B", "USDC", "USDC", json!("10"));

        match validate_decision(&raw, &registry, &vaults) {
            ValidatedDecision::Swap(plan) => {
                assert_eq!(plan.from_chain, "A");
                assert_eq!(plan.target_chain, "B");
                assert_eq!(plan.amount_raw, U256::from(10_000_000u64));
                assert_eq!(plan.recipient, registry.get("B").unwrap().vault.unwrap());
                assert_eq!(plan.reason, "rebalance");
            }
            other => panic!("expected swap, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_chain_or_token_coerced() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);

        assert_coerced(validate_decision(
            &swap("Z", "B", "USDC", "USDC", json!("1")),
            &registry,
            &vaults,
        ));
        assert_coerced(validate_decision(
            &swap("A", "MOON", "USDC", "USDC", json!("1")),
            &registry,
            &vaults,
        ));
        assert_coerced(validate_decision(
            &swap("A", "B", "DOGE", "USDC", json!("1")),
            &registry,
            &vaults,
        ));
        assert_coerced(validate_decision(
            &swap("A", "B", "USDC", "", json!("1")),
            &registry,
            &vaults,
        ));
    }

    #[test]
    fn test_bad_amounts_coerced() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);
        for amount in [json!("0"), json!("-5"), json!("abc"), json!("0.0000001"), json!(null)] {
            assert_coerced(validate_decision(
                &swap("A", "B", "USDC", "USDC", amount),
                &registry,
                &vaults,
            ));
        }
    }

    #[test]
    fn test_numeric_amount_accepted() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);
        let result = validate_decision(&swap("A", "B", "USDC", "USDC", json!(2.5)), &registry, &vaults);
        match result {
            ValidatedDecision::Swap(plan) => assert_eq!(plan.amount_raw, U256::from(2_500_000u64)),
            other => panic!("expected swap, got {other:?}"),
        }
    }

    #[test]
    fn test_same_chain_same_token_rejected() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);
        assert_coerced(validate_decision(
            &swap("A", "A", "USDC", "USDC", json!("5")),
            &registry,
            &vaults,
        ));

        // Same chain, different token is a plain swap
        let result = validate_decision(&swap("A", "A", "USDC", "WETH", json!("5")), &registry, &vaults);
        assert!(matches!(result, ValidatedDecision::Swap(_)));
    }

    #[test]
    fn test_vault_address_must_be_managed() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![VAULT_B]);

        let mut raw = swap("A", "B", "USDC", "USDC", json!("1"));
        raw["vaultAddress"] = json!(VAULT_B.to_string());
        match validate_decision(&raw, &registry, &vaults) {
            ValidatedDecision::Swap(plan) => {
                assert_eq!(plan.recipient, VAULT_B);
                assert_eq!(plan.vault_address, Some(VAULT_B));
            }
            other => panic!("expected swap, got {other:?}"),
        }

        // the source vault named on a cross-chain swap never becomes the recipient
        raw["vaultAddress"] = json!(VAULT_A.to_string());
        match validate_decision(&raw, &registry, &vaults) {
            ValidatedDecision::Swap(plan) => {
                assert_eq!(plan.recipient, registry.get("B").unwrap().vault.unwrap());
                assert_eq!(plan.vault_address, Some(VAULT_A));
            }
            other => panic!("expected swap, got {other:?}"),
        }

        raw["vaultAddress"] = json!("0x9999999999999999999999999999999999999999");
        assert_coerced(validate_decision(&raw, &registry, &vaults));

        raw["vaultAddress"] = json!("not-an-address");
        assert_coerced(validate_decision(&raw, &registry, &vaults));
    }

    #[test]
    fn test_wait_and_malformed_actions() {
        let registry = registry_two_chains();
        let vaults = VaultSet::new(VAULT_A, vec![]);

        let wait = validate_decision(
            &json!({"action": "wait", "reason": "balanced"}),
            &registry,
            &vaults,
        );
        assert_eq!(
            wait,
            ValidatedDecision::Wait {
                reason: "balanced".to_string(),
                origin: DecisionOrigin::Policy
            }
        );

        assert_coerced(validate_decision(&json!({"action": "HODL"}), &registry, &vaults));
        assert_coerced(validate_decision(&json!({}), &registry, &vaults));
        assert_coerced(validate_decision(&json!([1, 2]), &registry, &vaults));
    }

    #[test]
    fn test_decision_wire_format() {
        let decision = RebalanceDecision::Swap {
            vault_address: None,
            from_chain: "BAS".to_string(),
            target_chain: "SEP".to_string(),
            source_token: TokenSymbol::Usdc,
            target_token: TokenSymbol::Usdc,
            amount: "10".to_string(),
            reason: "idle funds".to_string(),
        };
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["action"], "SWAP");
        assert_eq!(value["fromChain"], "BAS");
        assert_eq!(value["sourceToken"], "USDC");
        assert!(value.get("vaultAddress").is_none());

        let wait = serde_json::to_value(RebalanceDecision::wait(DECISION_UNAVAILABLE)).unwrap();
        assert_eq!(wait, json!({"action": "WAIT", "reason": "decision unavailable"}));
    }
}
