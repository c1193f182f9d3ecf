//! Vault Rebalancer CLI
//!
//! Command-line interface for running the cross-chain rebalancing agent.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vault_rebalancer::bridge::{LifiQuoter, QuoteRequest, RouteQuoter};
use vault_rebalancer::config::PRIVATE_KEY_ENV;
use vault_rebalancer::tokens::{parse_units, TokenSymbol};
use vault_rebalancer::wallet::SecureWallet;
use vault_rebalancer::{AgentService, ChainRegistry, Config, CycleResponse, Error, Result};

#[derive(Parser)]
#[command(name = "rebalance-agent")]
#[command(about = "Cross-chain liquidity rebalancing agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single rebalance cycle
    Run {
        /// Additional vault to manage (repeatable)
        #[arg(long = "vault")]
        vaults: Vec<String>,
    },

    /// Run a cycle every `check_interval_ms` until interrupted
    Watch {
        /// Additional vault to manage (repeatable)
        #[arg(long = "vault")]
        vaults: Vec<String>,
    },

    /// Print vault balances across all chains
    Scan {
        /// Additional vault to scan (repeatable)
        #[arg(long = "vault")]
        vaults: Vec<String>,
    },

    /// Ask the bridge for a route without executing it
    Quote {
        /// Source chain key (e.g. BAS)
        #[arg(long)]
        from: String,

        /// Destination chain key (e.g. SEP)
        #[arg(long)]
        to: String,

        /// Source token symbol
        #[arg(long, default_value = "USDC")]
        token: String,

        /// Destination token symbol, defaults to the source token
        #[arg(long)]
        target_token: Option<String>,

        /// Amount in human units (e.g. 10.5)
        #[arg(long)]
        amount: String,

        /// Sender address, defaults to the PRIVATE_KEY account
        #[arg(long)]
        sender: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    if cli.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    // Load config
    let config: Config = if let Some(config_path) = cli.config {
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| Error::Config(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Run { vaults } => {
            let service = build_service(&config, &vaults).await?;
            let response = service.run_cycle().await;
            print_json(&response)?;
            if let Some(message) = response.error {
                return Err(Error::Cycle(message));
            }
        }
        Commands::Watch { vaults } => {
            let service = build_service(&config, &vaults).await?;
            watch(&service, Duration::from_millis(config.check_interval_ms)).await?;
        }
        Commands::Scan { vaults } => {
            let service = build_service(&config, &vaults).await?;
            let report = service.scan().await;
            print_json(&report)?;
            for failure in report.failures() {
                eprintln!(
                    "read failed, reported as 0: {} {} {}: {}",
                    failure.vault, failure.chain, failure.symbol, failure.error
                );
            }
        }
        Commands::Quote {
            from,
            to,
            token,
            target_token,
            amount,
            sender,
        } => {
            run_quote(&config, &from, &to, &token, target_token.as_deref(), &amount, sender).await?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_service(config: &Config, vaults: &[String]) -> Result<AgentService> {
    let service = AgentService::from_config(config)?;
    for vault in vaults {
        let count = service.register_vault(vault).await?;
        tracing::info!(vault = %vault, registered = count, "Vault registered from command line");
    }
    Ok(service)
}

async fn watch(service: &AgentService, interval: Duration) -> Result<()> {
    tracing::info!(interval = ?interval, "Watching vaults");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let response = service.run_cycle().await;
                log_cycle(&response);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

fn log_cycle(response: &CycleResponse) {
    match &response.error {
        Some(error) => tracing::error!(cycle_id = %response.cycle_id, %error, "Cycle failed"),
        None => tracing::info!(
            cycle_id = %response.cycle_id,
            decision = ?response.decision,
            tx_hash = ?response.tx_hash,
            simulated = response.simulated,
            "Cycle complete"
        ),
    }
}

async fn run_quote(
    config: &Config,
    from: &str,
    to: &str,
    token: &str,
    target_token: Option<&str>,
    amount: &str,
    sender: Option<String>,
) -> Result<()> {
    let registry = ChainRegistry::from_env(&config.chains)?;
    let source = registry
        .get(from)
        .ok_or_else(|| Error::InvalidArgument(format!("Unknown chain: {}", from)))?;
    let target = registry
        .get(to)
        .ok_or_else(|| Error::InvalidArgument(format!("Unknown chain: {}", to)))?;

    let source_symbol = TokenSymbol::from_str(token).map_err(Error::InvalidArgument)?;
    let target_symbol = match target_token {
        Some(symbol) => TokenSymbol::from_str(symbol).map_err(Error::InvalidArgument)?,
        None => source_symbol,
    };
    let from_token = source.token_address(source_symbol).ok_or_else(|| {
        Error::InvalidArgument(format!("{} is not listed on {}", source_symbol, source.key))
    })?;
    let to_token = target.token_address(target_symbol).ok_or_else(|| {
        Error::InvalidArgument(format!("{} is not listed on {}", target_symbol, target.key))
    })?;

    let amount = parse_units(amount, source_symbol.decimals())
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let sender = match sender {
        Some(raw) => Address::from_str(&raw)
            .map_err(|e| Error::InvalidArgument(format!("Invalid sender: {}", e)))?,
        None => SecureWallet::from_env(PRIVATE_KEY_ENV)?.address(),
    };
    let recipient = target.vault.ok_or_else(|| {
        Error::Config(format!("No vault configured on {}", target.key))
    })?;

    let quoter = LifiQuoter::new(&config.bridge)?;
    let request = QuoteRequest {
        from_chain_id: source.chain_id,
        to_chain_id: target.chain_id,
        from_token,
        to_token,
        amount,
        sender,
        recipient,
        destination_call: None,
    };

    match quoter.quote(&request).await {
        Ok(quote) => print_json(&quote),
        Err(no_route) => Err(Error::Bridge(no_route.reason)),
    }
}
