//! One rebalance cycle
//!
//! scan → decide → validate → (quote → approve → submit → monitor) | wait

use crate::chain::ChainReader;
use crate::config::ChainRegistry;
use crate::decision::{
    validate_decision, DecisionOrigin, DecisionPolicy, RebalanceDecision, SwapPlan,
    ValidatedDecision,
};
use crate::executor::{ExecutionReport, ExecutionResult, TransactionExecutor};
use crate::monitor::{CompletionMonitor, DeliveryStatus, DeliveryTarget};
use crate::scanner::{BalanceReport, BalanceScanner};
use crate::vaults::VaultSet;
use crate::{Error, Result};
use alloy::primitives::U256;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything one cycle produced
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    pub report: BalanceReport,
    pub decision: RebalanceDecision,
    pub origin: DecisionOrigin,
    pub execution: Option<ExecutionReport>,
    pub delivery: Option<DeliveryStatus>,
}

pub struct RebalanceOrchestrator {
    registry: Arc<ChainRegistry>,
    scanner: BalanceScanner,
    reader: Arc<dyn ChainReader>,
    policy: Arc<dyn DecisionPolicy>,
    executor: TransactionExecutor,
    monitor: Option<CompletionMonitor>,
    capital_usd: f64,
}

impl RebalanceOrchestrator {
    pub fn new(
        registry: Arc<ChainRegistry>,
        reader: Arc<dyn ChainReader>,
        policy: Arc<dyn DecisionPolicy>,
        executor: TransactionExecutor,
        capital_usd: f64,
    ) -> Self {
        Self {
            scanner: BalanceScanner::new(registry.clone(), reader.clone()),
            registry,
            reader,
            policy,
            executor,
            monitor: None,
            capital_usd,
        }
    }

    /// Confirm delivery of live submissions
    pub fn with_monitor(mut self, monitor: CompletionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn scanner(&self) -> &BalanceScanner {
        &self.scanner
    }

    /// Ask the policy and validate its answer
    pub async fn decide(&self, report: &BalanceReport, vaults: &VaultSet) -> ValidatedDecision {
        match self.policy.decide(report, self.capital_usd).await {
            Ok(raw) => validate_decision(&raw, &self.registry, vaults),
            Err(e) => {
                warn!(policy = self.policy.name(), error = %e, "Decision unavailable, waiting");
                ValidatedDecision::unavailable()
            }
        }
    }

    /// Run one cycle over a vault snapshot
    pub async fn run_cycle(&self, cycle_id: Uuid, vaults: &VaultSet) -> Result<CycleOutcome> {
        self.cycle(cycle_id, vaults)
            .instrument(info_span!("cycle", %cycle_id))
            .await
    }

    async fn cycle(&self, cycle_id: Uuid, vaults: &VaultSet) -> Result<CycleOutcome> {
        if vaults.is_empty() {
            return Err(Error::Cycle("No vaults to scan".to_string()));
        }

        let report = self.scanner.scan(vaults).await;
        let validated = self.decide(&report, vaults).await;
        let decision = validated.decision();
        let origin = validated.origin();

        let plan = match validated {
            ValidatedDecision::Wait { reason, .. } => {
                info!(reason = %reason, ?origin, "Waiting");
                return Ok(CycleOutcome {
                    cycle_id,
                    report,
                    decision,
                    origin,
                    execution: None,
                    delivery: None,
                });
            }
            ValidatedDecision::Swap(plan) => plan,
        };

        info!(
            from = %plan.from_chain,
            to = %plan.target_chain,
            amount = %plan.amount,
            token = %plan.source_token,
            reason = %plan.reason,
            "Rebalance decided"
        );

        let baseline = match &self.monitor {
            Some(_) => self.baseline(&plan).await,
            None => Err("delivery monitoring disabled".to_string()),
        };

        let execution = self.executor.execute(&plan).await?;

        let delivery = match (&self.monitor, &execution.result) {
            (None, _) => None,
            (Some(_), ExecutionResult::Simulated { .. }) => {
                Some(DeliveryStatus::skipped("simulated execution"))
            }
            (Some(monitor), ExecutionResult::Submitted { .. }) => Some(match baseline {
                Ok(before) => self.monitor_delivery(monitor, &plan, before).await?,
                Err(reason) => DeliveryStatus::skipped(reason),
            }),
        };

        Ok(CycleOutcome {
            cycle_id,
            report,
            decision,
            origin,
            execution: Some(execution),
            delivery,
        })
    }

    /// Destination balance before submission
    async fn baseline(&self, plan: &SwapPlan) -> std::result::Result<U256, String> {
        let chain = self
            .registry
            .get(&plan.target_chain)
            .ok_or_else(|| format!("chain {} is not registered", plan.target_chain))?;
        if chain.is_native(plan.target_token) {
            return Err("native balances are not tracked".to_string());
        }
        let token = chain
            .token_address(plan.target_token)
            .ok_or_else(|| format!("token {} is not listed", plan.target_token))?;
        self.reader
            .balance_of(chain, token, plan.recipient)
            .await
            .map_err(|e| {
                warn!(error = %e, "Could not read destination baseline");
                format!("baseline balance unavailable: {}", e)
            })
    }

    async fn monitor_delivery(
        &self,
        monitor: &CompletionMonitor,
        plan: &SwapPlan,
        before: U256,
    ) -> Result<DeliveryStatus> {
        let chain = self.registry.get(&plan.target_chain).ok_or_else(|| {
            Error::Cycle(format!("Chain {} is not registered", plan.target_chain))
        })?;
        let token = chain.token_address(plan.target_token).ok_or_else(|| {
            Error::Cycle(format!("Token {} is not listed", plan.target_token))
        })?;
        Ok(monitor
            .wait_for_delivery(DeliveryTarget {
                chain,
                token,
                decimals: plan.target_token.decimals(),
                vault: plan.recipient,
                before,
            })
            .await)
    }
}
