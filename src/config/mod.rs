//! Configuration for the rebalancing agent

pub mod chains;

use crate::tokens::TokenSymbol;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use chains::{ChainDescriptor, ChainRegistry, ChainSpec, TokenSpec};

/// Environment variable holding the agent's signing key
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// Bridge aggregator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Aggregator API base URL
    pub base_url: String,
    /// Upper bound on a single quote request (milliseconds)
    pub quote_timeout_ms: u64,
    /// Optional integrator tag sent with every quote request
    #[serde(default)]
    pub integrator: Option<String>,
    /// Optional slippage tolerance as a fraction (0.005 = 0.5%)
    #[serde(default)]
    pub slippage: Option<f64>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://li.quest/v1".to_string(),
            quote_timeout_ms: 15_000,
            integrator: None,
            slippage: None,
        }
    }
}

impl BridgeSettings {
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }
}

/// Whether a rebalance rule moves funds between chains or within one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    CrossChain,
    SameChain,
}

/// A deterministic rebalance rule evaluated by the threshold policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Token the rule watches
    pub token: TokenSymbol,
    /// Token to receive; defaults to the watched token
    #[serde(default)]
    pub target_token: Option<TokenSymbol>,
    /// Source balance must be strictly above this (human units)
    pub min_source_balance: String,
    /// Target balance must be at or below this (human units)
    pub max_target_balance: String,
    #[serde(default)]
    pub routing: RoutingMode,
}

/// Which decision policy drives the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSettings {
    /// OpenAI-compatible chat completion endpoint
    Chat {
        base_url: String,
        model: String,
        /// Environment variable holding the endpoint's API key
        api_key_env: String,
        timeout_ms: u64,
        /// Free-form guidance included in the prompt
        #[serde(default)]
        rules: Vec<String>,
    },
    /// Local rule evaluation, no external calls
    Threshold { rules: Vec<ThresholdRule> },
}

impl Default for DecisionSettings {
    fn default() -> Self {
        DecisionSettings::Chat {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_ms: 30_000,
            rules: vec![
                "If a vault has more than 5 USDC on one chain and 0 on another, propose a SWAP."
                    .to_string(),
                "Use ONLY the chain keys and token symbols listed above.".to_string(),
            ],
        }
    }
}

/// Fixed delays and bounds used by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Wait after submitting an approval before moving on
    pub approval_settle_ms: u64,
    /// Emulated latency before a simulated submission returns
    pub simulation_delay_ms: u64,
    /// Upper bound on any single chain read or write
    pub rpc_timeout_ms: u64,
    /// Delay between delivery checks
    pub monitor_interval_ms: u64,
    /// Delivery checks before giving up
    pub monitor_max_attempts: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            approval_settle_ms: 5_000,
            simulation_delay_ms: 2_000,
            rpc_timeout_ms: 10_000,
            monitor_interval_ms: 15_000,
            monitor_max_attempts: 20,
        }
    }
}

impl TimingSettings {
    pub fn approval_settle(&self) -> Duration {
        Duration::from_millis(self.approval_settle_ms)
    }

    pub fn simulation_delay(&self) -> Duration {
        Duration::from_millis(self.simulation_delay_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// What happens when the live route is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Emit a clearly flagged simulated submission
    #[default]
    Simulate,
    /// Report the cycle as failed
    Disabled,
}

/// Destination callback executed by the bridge on delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackSettings {
    /// Pool fee tier passed to the vault's `onFundsReceived`
    pub pool_fee: u32,
    /// Gas limit for the destination call
    pub gas_limit: u64,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chains the agent manages, in scan order
    pub chains: Vec<ChainSpec>,
    pub bridge: BridgeSettings,
    pub decision: DecisionSettings,
    pub timing: TimingSettings,
    pub fallback: FallbackMode,
    /// Poll the destination chain after a live submission
    pub monitor_delivery: bool,
    pub callback: Option<CallbackSettings>,
    /// Capital under consideration, passed to the decision policy
    pub capital_usd: f64,
    /// Interval between cycles in watch mode (milliseconds)
    pub check_interval_ms: u64,
    /// Path to the cycle audit log
    pub audit_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: chains::testnet_specs(),
            bridge: BridgeSettings::default(),
            decision: DecisionSettings::default(),
            timing: TimingSettings::default(),
            fallback: FallbackMode::Simulate,
            monitor_delivery: false,
            callback: None,
            capital_usd: 1_000.0,
            check_interval_ms: 300_000, // 5 minutes
            audit_log_path: Some("rebalance-audit.jsonl".to_string()),
        }
    }
}
