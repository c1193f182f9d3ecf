//! Transaction executor
//!
//! Runs one swap plan through `Idle → Quoting → Approving → Submitting →
//! {Submitted | Simulated} → Done`. When the bridge has no route, or the
//! source chain refuses the transaction before broadcast, the configured
//! [`FallbackMode`] decides between a flagged simulated submission and a
//! cycle failure.

use crate::approval::{ApprovalManager, ApprovalOutcome};
use crate::bridge::{
    encode_on_funds_received, DestinationCall, Quote, QuoteRequest, RouteQuoter,
};
use crate::chain::{ChainWriter, TransactionCall, WriteError};
use crate::config::{CallbackSettings, ChainDescriptor, ChainRegistry, FallbackMode};
use crate::decision::SwapPlan;
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pipeline stage of a single execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Idle,
    Quoting,
    Approving,
    Submitting,
    Submitted,
    Simulated,
    Done,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStage::Idle => "idle",
            ExecutionStage::Quoting => "quoting",
            ExecutionStage::Approving => "approving",
            ExecutionStage::Submitting => "submitting",
            ExecutionStage::Submitted => "submitted",
            ExecutionStage::Simulated => "simulated",
            ExecutionStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Live or simulated submission
///
/// The `mode` tag survives serialization so a simulated id is never mistaken
/// for a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// `acknowledged` is false when the node never confirmed receipt; the
    /// transaction may still land and is never replaced by a simulation.
    Submitted {
        tx_hash: TxHash,
        tool: String,
        acknowledged: bool,
    },
    Simulated { tx_hash: String, reason: String },
}

impl ExecutionResult {
    pub fn tx_hash(&self) -> String {
        match self {
            ExecutionResult::Submitted { tx_hash, .. } => tx_hash.to_string(),
            ExecutionResult::Simulated { tx_hash, .. } => tx_hash.clone(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ExecutionResult::Simulated { .. })
    }
}

/// Everything the executor did for one plan
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub result: ExecutionResult,
    pub quote: Option<Quote>,
    pub approval: Option<ApprovalOutcome>,
    pub stages: Vec<ExecutionStage>,
}

/// Stage trace for one execution
struct StageTrace {
    stages: Vec<ExecutionStage>,
}

impl StageTrace {
    fn new() -> Self {
        Self {
            stages: vec![ExecutionStage::Idle],
        }
    }

    fn enter(&mut self, stage: ExecutionStage) {
        let from = self.stages.last().copied().unwrap_or(ExecutionStage::Idle);
        tracing::debug!(%from, to = %stage, "Execution stage");
        self.stages.push(stage);
    }

    fn finish(mut self) -> Vec<ExecutionStage> {
        self.enter(ExecutionStage::Done);
        self.stages
    }
}

/// Synthesize a simulated transaction id: `0x` + 64 hex characters
pub fn mock_tx_hash() -> String {
    let seed = uuid::Uuid::new_v4();
    format!("0x{}", blake3::hash(seed.as_bytes()).to_hex())
}

pub struct TransactionExecutor {
    registry: Arc<ChainRegistry>,
    quoter: Arc<dyn RouteQuoter>,
    approvals: ApprovalManager,
    writer: Arc<dyn ChainWriter>,
    fallback: FallbackMode,
    simulation_delay: Duration,
    callback: Option<CallbackSettings>,
}

impl TransactionExecutor {
    pub fn new(
        registry: Arc<ChainRegistry>,
        quoter: Arc<dyn RouteQuoter>,
        writer: Arc<dyn ChainWriter>,
        approval_settle: Duration,
    ) -> Self {
        Self {
            registry,
            quoter,
            approvals: ApprovalManager::new(writer.clone(), approval_settle),
            writer,
            fallback: FallbackMode::Simulate,
            simulation_delay: Duration::from_secs(2),
            callback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackMode, simulation_delay: Duration) -> Self {
        self.fallback = fallback;
        self.simulation_delay = simulation_delay;
        self
    }

    pub fn with_callback(mut self, callback: Option<CallbackSettings>) -> Self {
        self.callback = callback;
        self
    }

    fn chain(&self, key: &str) -> Result<&ChainDescriptor> {
        self.registry
            .get(key)
            .ok_or_else(|| Error::Cycle(format!("Chain {} is not registered", key)))
    }

    /// Build the quote request for a validated plan
    pub fn quote_request(&self, plan: &SwapPlan) -> Result<QuoteRequest> {
        let source = self.chain(&plan.from_chain)?;
        let target = self.chain(&plan.target_chain)?;
        let from_token = token_address(source, plan)?;
        let to_token = target.token_address(plan.target_token).ok_or_else(|| {
            Error::Cycle(format!(
                "Token {} is not listed on {}",
                plan.target_token, target.key
            ))
        })?;

        let destination_call = match &self.callback {
            Some(callback) => Some(DestinationCall {
                target: plan.recipient,
                data: encode_on_funds_received(to_token, callback.pool_fee)?,
                gas_limit: callback.gas_limit,
            }),
            None => None,
        };

        Ok(QuoteRequest {
            from_chain_id: source.chain_id,
            to_chain_id: target.chain_id,
            from_token,
            to_token,
            amount: plan.amount_raw,
            sender: self.writer.sender(),
            recipient: plan.recipient,
            destination_call,
        })
    }

    /// Quote, approve and submit a plan
    pub async fn execute(&self, plan: &SwapPlan) -> Result<ExecutionReport> {
        let mut trace = StageTrace::new();
        let source = self.chain(&plan.from_chain)?;

        info!(
            from = %plan.from_chain,
            to = %plan.target_chain,
            source_token = %plan.source_token,
            target_token = %plan.target_token,
            amount = %plan.amount,
            "Executing rebalance"
        );

        trace.enter(ExecutionStage::Quoting);
        let request = self.quote_request(plan)?;
        let quote = match self.quoter.quote(&request).await {
            Ok(quote) => quote,
            Err(no_route) => {
                warn!(quoter = self.quoter.name(), reason = %no_route.reason, "No usable route");
                let result = self.fall_back(&mut trace, no_route.to_string()).await?;
                return Ok(ExecutionReport {
                    result,
                    quote: None,
                    approval: None,
                    stages: trace.finish(),
                });
            }
        };

        trace.enter(ExecutionStage::Approving);
        let approval = self
            .approvals
            .ensure_allowance(source, request.from_token, quote.spender, request.amount)
            .await;

        trace.enter(ExecutionStage::Submitting);
        let call = TransactionCall {
            to: quote.to,
            data: quote.data.clone(),
            value: quote.value,
            gas_limit: quote.gas_limit,
        };
        let result = match self.writer.send_transaction(source, &call).await {
            Ok(tx_hash) => {
                info!(%tx_hash, tool = %quote.tool, chain = %source.key, "Bridge transaction submitted");
                trace.enter(ExecutionStage::Submitted);
                ExecutionResult::Submitted {
                    tx_hash,
                    tool: quote.tool.clone(),
                    acknowledged: true,
                }
            }
            Err(WriteError::Unconfirmed { tx_hash, reason }) => {
                warn!(
                    %tx_hash,
                    chain = %source.key,
                    reason = %reason,
                    "Bridge transaction sent without acknowledgement, delivery unconfirmed"
                );
                trace.enter(ExecutionStage::Submitted);
                ExecutionResult::Submitted {
                    tx_hash,
                    tool: quote.tool.clone(),
                    acknowledged: false,
                }
            }
            Err(e) => {
                warn!(chain = %source.key, error = %e, "Submission failed before broadcast");
                self.fall_back(&mut trace, e.to_string()).await?
            }
        };

        Ok(ExecutionReport {
            result,
            quote: Some(quote),
            approval: Some(approval),
            stages: trace.finish(),
        })
    }

    async fn fall_back(&self, trace: &mut StageTrace, reason: String) -> Result<ExecutionResult> {
        match self.fallback {
            FallbackMode::Disabled => Err(Error::Bridge(format!(
                "Live execution unavailable and simulation disabled: {}",
                reason
            ))),
            FallbackMode::Simulate => {
                warn!(
                    delay = ?self.simulation_delay,
                    reason = %reason,
                    "SIMULATED execution, this is not a real transfer"
                );
                tokio::time::sleep(self.simulation_delay).await;
                let tx_hash = mock_tx_hash();
                warn!(%tx_hash, "SIMULATED transaction id issued");
                trace.enter(ExecutionStage::Simulated);
                Ok(ExecutionResult::Simulated { tx_hash, reason })
            }
        }
    }
}

fn token_address(chain: &ChainDescriptor, plan: &SwapPlan) -> Result<Address> {
    chain.token_address(plan.source_token).ok_or_else(|| {
        Error::Cycle(format!(
            "Token {} is not listed on {}",
            plan.source_token, chain.key
        ))
    })
}
