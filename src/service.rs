//! Agent service
//!
//! The boundary a front door (CLI, HTTP server) talks to: vault
//! registration and cycle triggering. A cycle never takes the host down;
//! errors and panics inside it come back as a `success: false` response.

use crate::audit::AuditLog;
use crate::bridge::{LifiQuoter, RouteQuoter};
use crate::chain::{ChainReader, ChainWriter, RpcChainReader, RpcChainWriter};
use crate::config::{ChainRegistry, Config, PRIVATE_KEY_ENV};
use crate::decision::{build_policy, DecisionOrigin, RebalanceDecision};
use crate::executor::{ExecutionReport, TransactionExecutor};
use crate::monitor::{CompletionMonitor, DeliveryStatus};
use crate::orchestrator::{CycleOutcome, RebalanceOrchestrator};
use crate::scanner::{BalanceReport, ReadFailure};
use crate::vaults::{VaultRegistry, VaultSet};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Response for one cycle trigger
#[derive(Debug, Clone, Serialize)]
pub struct CycleResponse {
    pub success: bool,
    pub cycle_id: Uuid,
    pub decision: Option<RebalanceDecision>,
    pub decision_origin: Option<DecisionOrigin>,
    /// Live or simulated transaction id; see `simulated`
    pub tx_hash: Option<String>,
    pub simulated: bool,
    pub execution: Option<ExecutionReport>,
    pub delivery: Option<DeliveryStatus>,
    /// Balances reported as zero because their read failed
    pub read_failures: Vec<ReadFailure>,
    pub error: Option<String>,
}

impl CycleResponse {
    fn from_outcome(outcome: CycleOutcome) -> Self {
        let tx_hash = outcome.execution.as_ref().map(|e| e.result.tx_hash());
        let simulated = outcome
            .execution
            .as_ref()
            .is_some_and(|e| e.result.is_simulated());
        Self {
            success: true,
            cycle_id: outcome.cycle_id,
            decision: Some(outcome.decision),
            decision_origin: Some(outcome.origin),
            tx_hash,
            simulated,
            execution: outcome.execution,
            delivery: outcome.delivery,
            read_failures: outcome.report.failures().to_vec(),
            error: None,
        }
    }

    fn failure(cycle_id: Uuid, message: String) -> Self {
        Self {
            success: false,
            cycle_id,
            decision: None,
            decision_origin: None,
            tx_hash: None,
            simulated: false,
            execution: None,
            delivery: None,
            read_failures: Vec::new(),
            error: Some(message),
        }
    }
}

pub struct AgentService {
    vaults: VaultRegistry,
    orchestrator: Arc<RebalanceOrchestrator>,
    audit: Option<AuditLog>,
}

impl AgentService {
    pub fn new(orchestrator: RebalanceOrchestrator, vaults: VaultRegistry) -> Self {
        Self {
            vaults,
            orchestrator: Arc::new(orchestrator),
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Wire the live pipeline from configuration and the environment
    ///
    /// Fails with [`Error::Config`] when an endpoint, vault or key is
    /// missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(ChainRegistry::from_env(&config.chains)?);
        let wallet = SecureWallet::from_env(PRIVATE_KEY_ENV)?;
        info!(agent = %wallet.address(), chains = ?registry.keys(), "Agent wallet loaded");

        let timeout = config.timing.rpc_timeout();
        let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(timeout));
        let writer: Arc<dyn ChainWriter> = Arc::new(RpcChainWriter::new(wallet, timeout));
        let quoter: Arc<dyn RouteQuoter> = Arc::new(LifiQuoter::new(&config.bridge)?);
        let policy = build_policy(&config.decision, registry.clone())?;

        let executor = TransactionExecutor::new(
            registry.clone(),
            quoter,
            writer,
            config.timing.approval_settle(),
        )
        .with_fallback(config.fallback, config.timing.simulation_delay())
        .with_callback(config.callback.clone());

        let mut orchestrator = RebalanceOrchestrator::new(
            registry,
            reader.clone(),
            policy,
            executor,
            config.capital_usd,
        );
        if config.monitor_delivery {
            orchestrator = orchestrator.with_monitor(CompletionMonitor::new(
                reader,
                config.timing.monitor_interval(),
                config.timing.monitor_max_attempts,
            ));
        }

        let mut service = Self::new(orchestrator, VaultRegistry::new());
        if let Some(path) = &config.audit_log_path {
            service = service.with_audit_log(AuditLog::new(path));
        }
        Ok(service)
    }

    /// Track an additional vault; returns the number of registered vaults
    pub async fn register_vault(&self, address: &str) -> Result<usize> {
        self.vaults.register(address).await
    }

    /// The vaults the next cycle will scan
    pub async fn vaults(&self) -> VaultSet {
        VaultSet::new(
            self.orchestrator.registry().primary_vault(),
            self.vaults.snapshot().await,
        )
    }

    /// Balance report for the current vault set, without deciding
    pub async fn scan(&self) -> BalanceReport {
        let vaults = self.vaults().await;
        self.orchestrator.scanner().scan(&vaults).await
    }

    /// Run one cycle and report its outcome
    pub async fn run_cycle(&self) -> CycleResponse {
        let cycle_id = Uuid::new_v4();
        let vaults = self.vaults().await;
        let orchestrator = self.orchestrator.clone();

        let handle =
            tokio::spawn(async move { orchestrator.run_cycle(cycle_id, &vaults).await });

        let response = match handle.await {
            Ok(Ok(outcome)) => CycleResponse::from_outcome(outcome),
            Ok(Err(e)) => {
                error!(%cycle_id, error = %e, "Cycle failed");
                CycleResponse::failure(cycle_id, e.to_string())
            }
            Err(join_error) => {
                let e = Error::Cycle(format!("cycle task aborted: {}", join_error));
                error!(%cycle_id, error = %e, "Cycle crashed");
                CycleResponse::failure(cycle_id, e.to_string())
            }
        };

        if let Some(audit) = &self.audit {
            audit.record(&response).await;
        }
        response
    }
}
