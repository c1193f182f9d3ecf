//! Rule-based decision policy
//!
//! Evaluates [`ThresholdRule`]s from configuration against the balance
//! report. Which tokens may move cross-chain and which only swap in place is
//! decided entirely by the rules' routing mode.

use super::{DecisionError, DecisionPolicy};
use crate::config::{ChainDescriptor, ChainRegistry, RoutingMode, ThresholdRule};
use crate::scanner::BalanceReport;
use crate::tokens::{format_units, parse_units, TokenSymbol};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CompiledRule {
    token: TokenSymbol,
    target_token: TokenSymbol,
    min_source: U256,
    max_target: U256,
    routing: RoutingMode,
}

/// Deterministic policy: first matching rule wins
pub struct ThresholdPolicy {
    rules: Vec<CompiledRule>,
    registry: Arc<ChainRegistry>,
}

impl ThresholdPolicy {
    pub fn new(rules: Vec<ThresholdRule>, registry: Arc<ChainRegistry>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, registry })
    }

    fn balance(
        report: &BalanceReport,
        vault: &Address,
        chain: &ChainDescriptor,
        symbol: TokenSymbol,
    ) -> Option<U256> {
        if report.read_failed(vault, &chain.key, symbol) {
            return None;
        }
        let text = report.balance(vault, &chain.key, symbol)?;
        parse_units(text, symbol.decimals()).ok()
    }

    fn evaluate(&self, report: &BalanceReport) -> Option<Value> {
        for vault in report.vaults() {
            for rule in &self.rules {
                for source in self.registry.chains() {
                    let Some(available) = Self::balance(report, vault, source, rule.token) else {
                        continue;
                    };
                    if available <= rule.min_source {
                        continue;
                    }

                    let targets: Vec<&ChainDescriptor> = match rule.routing {
                        RoutingMode::CrossChain => self
                            .registry
                            .chains()
                            .iter()
                            .filter(|c| c.key != source.key)
                            .collect(),
                        RoutingMode::SameChain => vec![source],
                    };

                    for target in targets {
                        let Some(held) = Self::balance(report, vault, target, rule.target_token)
                        else {
                            continue;
                        };
                        if held > rule.max_target {
                            continue;
                        }
                        let amount = report
                            .balance(vault, &source.key, rule.token)
                            .unwrap_or("0");
                        return Some(json!({
                            "action": "SWAP",
                            "fromChain": source.key,
                            "targetChain": target.key,
                            "sourceToken": rule.token,
                            "targetToken": rule.target_token,
                            "amount": amount,
                            "vaultAddress": vault.to_string(),
                            "reason": format!(
                                "{} {} on {} above {}, {} {} on {} at or below {}",
                                amount,
                                rule.token,
                                source.key,
                                format_units(rule.min_source, rule.token.decimals()),
                                format_units(held, rule.target_token.decimals()),
                                rule.target_token,
                                target.key,
                                format_units(
                                    rule.max_target,
                                    rule.target_token.decimals()
                                ),
                            ),
                        }));
                    }
                }
            }
        }
        None
    }
}

fn compile_rule(rule: ThresholdRule) -> Result<CompiledRule> {
    let target_token = rule.target_token.unwrap_or(rule.token);
    if rule.routing == RoutingMode::SameChain && target_token == rule.token {
        return Err(Error::Config(format!(
            "Same-chain rule for {} must name a different target token",
            rule.token
        )));
    }
    let min_source = parse_units(&rule.min_source_balance, rule.token.decimals())
        .map_err(|e| Error::Config(format!("Invalid min_source_balance: {}", e)))?;
    let max_target = parse_units(&rule.max_target_balance, target_token.decimals())
        .map_err(|e| Error::Config(format!("Invalid max_target_balance: {}", e)))?;
    Ok(CompiledRule {
        token: rule.token,
        target_token,
        min_source,
        max_target,
        routing: rule.routing,
    })
}

#[async_trait]
impl DecisionPolicy for ThresholdPolicy {
    async fn decide(
        &self,
        report: &BalanceReport,
        _capital_usd: f64,
    ) -> std::result::Result<Value, DecisionError> {
        Ok(self.evaluate(report).unwrap_or_else(|| {
            json!({
                "action": "WAIT",
                "reason": "no threshold rule matched",
            })
        }))
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{validate_decision, ValidatedDecision};
    use crate::scanner::BalanceScanner;
    use crate::testing::{registry_two_chains, FakeChain, VAULT_A};
    use crate::vaults::VaultSet;

    fn usdc_rule(routing: RoutingMode, target: Option<TokenSymbol>) -> ThresholdRule {
        ThresholdRule {
            token: TokenSymbol::Usdc,
            target_token: target,
            min_source_balance: "5".to_string(),
            max_target_balance: "0".to_string(),
            routing,
        }
    }

    async fn report_for(chain: Arc<FakeChain>) -> BalanceReport {
        BalanceScanner::new(Arc::new(registry_two_chains()), chain)
            .scan(&VaultSet::new(VAULT_A, vec![]))
            .await
    }

    #[tokio::test]
    async fn test_moves_idle_usdc_cross_chain() {
        let chain = Arc::new(FakeChain::new());
        chain.set_balance("A", "USDC", VAULT_A, U256::from(10_000_000u64));
        let report = report_for(chain).await;

        let registry = Arc::new(registry_two_chains());
        let policy = ThresholdPolicy::new(
            vec![usdc_rule(RoutingMode::CrossChain, None)],
            registry.clone(),
        )
        .unwrap();
        let raw = policy.decide(&report, 1000.0).await.unwrap();

        assert_eq!(raw["action"], "SWAP");
        assert_eq!(raw["fromChain"], "A");
        assert_eq!(raw["targetChain"], "B");
        assert_eq!(raw["amount"], "10");

        assert_eq!(raw["vaultAddress"], VAULT_A.to_string());

        let validated = validate_decision(&raw, &registry, &VaultSet::new(VAULT_A, vec![]));
        match validated {
            ValidatedDecision::Swap(plan) => {
                assert_eq!(plan.recipient, registry.get("B").unwrap().vault.unwrap());
                assert_ne!(plan.recipient, VAULT_A);
            }
            other => panic!("expected swap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_waits_when_balanced() {
        let chain = Arc::new(FakeChain::new());
        chain.set_balance("A", "USDC", VAULT_A, U256::from(10_000_000u64));
        chain.set_balance("B", "USDC", VAULT_A, U256::from(10_000_000u64));
        let report = report_for(chain).await;

        let policy = ThresholdPolicy::new(
            vec![usdc_rule(RoutingMode::CrossChain, None)],
            Arc::new(registry_two_chains()),
        )
        .unwrap();
        let raw = policy.decide(&report, 1000.0).await.unwrap();
        assert_eq!(raw["action"], "WAIT");
    }

    #[tokio::test]
    async fn test_failed_read_is_not_a_target() {
        let chain = Arc::new(FakeChain::new());
        chain.set_balance("A", "USDC", VAULT_A, U256::from(10_000_000u64));
        chain.fail_read("B", "USDC");
        let report = report_for(chain).await;

        let policy = ThresholdPolicy::new(
            vec![usdc_rule(RoutingMode::CrossChain, None)],
            Arc::new(registry_two_chains()),
        )
        .unwrap();
        let raw = policy.decide(&report, 1000.0).await.unwrap();
        assert_eq!(raw["action"], "WAIT");
    }

    #[tokio::test]
    async fn test_same_chain_rule_swaps_in_place() {
        let chain = Arc::new(FakeChain::new());
        chain.set_balance("B", "USDC", VAULT_A, U256::from(8_000_000u64));
        let report = report_for(chain).await;

        let policy = ThresholdPolicy::new(
            vec![usdc_rule(RoutingMode::SameChain, Some(TokenSymbol::Weth))],
            Arc::new(registry_two_chains()),
        )
        .unwrap();
        let raw = policy.decide(&report, 1000.0).await.unwrap();
        assert_eq!(raw["fromChain"], "B");
        assert_eq!(raw["targetChain"], "B");
        assert_eq!(raw["targetToken"], "WETH");
    }

    #[test]
    fn test_rejects_noop_and_bad_thresholds() {
        let registry = Arc::new(registry_two_chains());
        assert!(ThresholdPolicy::new(vec![usdc_rule(RoutingMode::SameChain, None)], registry.clone()).is_err());

        let mut rule = usdc_rule(RoutingMode::CrossChain, None);
        rule.min_source_balance = "five".to_string();
        assert!(ThresholdPolicy::new(vec![rule], registry).is_err());
    }
}
