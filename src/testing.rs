//! In-memory fakes shared by the unit tests

use crate::bridge::{NoRoute, Quote, QuoteRequest, RouteQuoter};
use crate::chain::{ChainReader, ChainWriter, ReadError, TransactionCall, WriteError};
use crate::config::{ChainDescriptor, ChainRegistry, TokenSpec};
use crate::decision::{DecisionError, DecisionPolicy, SwapPlan};
use crate::scanner::BalanceReport;
use crate::tokens::{parse_units, TokenSymbol, NATIVE_SENTINEL};
use alloy::primitives::{address, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub const VAULT_A: Address = address!("1111111111111111111111111111111111111111");
pub const VAULT_B: Address = address!("2222222222222222222222222222222222222222");
pub const AGENT: Address = address!("9999999999999999999999999999999999999999");

fn chain(key: &str, chain_id: u64, usdc: Address, weth: Address, vault: Address) -> ChainDescriptor {
    ChainDescriptor {
        key: key.to_string(),
        chain_id,
        name: format!("Test chain {}", key),
        rpc_url: Url::parse(&format!("http://{}.chain.test", key.to_lowercase())).unwrap(),
        native_sentinel: NATIVE_SENTINEL,
        tokens: vec![
            TokenSpec {
                symbol: TokenSymbol::Usdc,
                address: usdc,
            },
            TokenSpec {
                symbol: TokenSymbol::Weth,
                address: weth,
            },
            TokenSpec {
                symbol: TokenSymbol::Eth,
                address: NATIVE_SENTINEL,
            },
        ],
        vault: Some(vault),
    }
}

/// Chain `A` (vault A) and chain `B` (vault B), each with USDC, WETH and ETH
pub fn registry_two_chains() -> ChainRegistry {
    ChainRegistry::new(vec![
        chain(
            "A",
            1,
            address!("000000000000000000000000000000000000a001"),
            address!("000000000000000000000000000000000000a002"),
            VAULT_A,
        ),
        chain(
            "B",
            2,
            address!("000000000000000000000000000000000000b001"),
            address!("000000000000000000000000000000000000b002"),
            VAULT_B,
        ),
    ])
    .unwrap()
}

fn token(chain: &str, symbol: &str) -> Address {
    let symbol: TokenSymbol = symbol.parse().unwrap();
    registry_two_chains()
        .get(chain)
        .and_then(|c| c.token_address(symbol))
        .unwrap()
}

/// Validated plan against [`registry_two_chains`]
pub fn plan(
    from: &str,
    to: &str,
    source: TokenSymbol,
    target: TokenSymbol,
    amount: &str,
) -> SwapPlan {
    let registry = registry_two_chains();
    SwapPlan {
        from_chain: from.to_string(),
        target_chain: to.to_string(),
        source_token: source,
        target_token: target,
        amount: amount.to_string(),
        amount_raw: parse_units(amount, source.decimals()).unwrap(),
        recipient: registry.get(to).unwrap().vault.unwrap(),
        vault_address: None,
        reason: "test".to_string(),
    }
}

pub fn sample_quote() -> Quote {
    Quote {
        to: address!("6666666666666666666666666666666666666666"),
        data: Bytes::from(vec![0x12, 0x34, 0x56, 0x78]),
        value: U256::ZERO,
        gas_limit: Some(300_000),
        tool: "across".to_string(),
        to_amount: Some("9900000".to_string()),
        fee_usd: Some("0.05".to_string()),
        spender: address!("5555555555555555555555555555555555555555"),
    }
}

type BalanceKey = (String, Address, Address);

/// Chain reader and writer over in-memory balances
#[derive(Default)]
pub struct FakeChain {
    balances: Mutex<HashMap<BalanceKey, VecDeque<U256>>>,
    failing: Mutex<HashSet<(String, Address)>>,
    reads: Mutex<Vec<BalanceKey>>,
    approvals: Mutex<Vec<(String, Address, Address, U256)>>,
    sent: Mutex<Vec<(String, TransactionCall, TxHash)>>,
    fail_approvals: AtomicBool,
    fail_sends: AtomicBool,
    drop_send_replies: AtomicBool,
    next_hash: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, chain: &str, symbol: &str, holder: Address, amount: U256) {
        self.queue_balances(chain, symbol, holder, vec![amount]);
    }

    /// Successive reads return these values; the last one repeats
    pub fn queue_balances(&self, chain: &str, symbol: &str, holder: Address, amounts: Vec<U256>) {
        let key = (chain.to_string(), token(chain, symbol), holder);
        self.balances
            .lock()
            .unwrap()
            .insert(key, amounts.into_iter().collect());
    }

    pub fn fail_read(&self, chain: &str, symbol: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((chain.to_string(), token(chain, symbol)));
    }

    pub fn fail_approvals(&self) {
        self.fail_approvals.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Sends reach the chain but the reply is lost
    pub fn drop_send_replies(&self) {
        self.drop_send_replies.store(true, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    pub fn distinct_holders_read(&self) -> HashSet<Address> {
        self.reads.lock().unwrap().iter().map(|(_, _, h)| *h).collect()
    }

    pub fn approvals(&self) -> Vec<(String, Address, Address, U256)> {
        self.approvals.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, TransactionCall, TxHash)> {
        self.sent.lock().unwrap().clone()
    }

    fn hash(&self) -> TxHash {
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst) + 1;
        TxHash::with_last_byte(n as u8)
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn balance_of(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        holder: Address,
    ) -> Result<U256, ReadError> {
        let key = (chain.key.clone(), token, holder);
        self.reads.lock().unwrap().push(key.clone());

        if self
            .failing
            .lock()
            .unwrap()
            .contains(&(chain.key.clone(), token))
        {
            return Err(ReadError::Rpc("execution reverted".to_string()));
        }

        let mut balances = self.balances.lock().unwrap();
        Ok(match balances.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().copied().unwrap_or_default(),
            None => U256::ZERO,
        })
    }
}

#[async_trait]
impl ChainWriter for FakeChain {
    fn sender(&self) -> Address {
        AGENT
    }

    async fn approve(
        &self,
        chain: &ChainDescriptor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, WriteError> {
        if self.fail_approvals.load(Ordering::SeqCst) {
            return Err(WriteError::Rejected("insufficient funds for gas".to_string()));
        }
        self.approvals
            .lock()
            .unwrap()
            .push((chain.key.clone(), token, spender, amount));
        Ok(self.hash())
    }

    async fn send_transaction(
        &self,
        chain: &ChainDescriptor,
        call: &TransactionCall,
    ) -> Result<TxHash, WriteError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WriteError::Rejected("nonce too low".to_string()));
        }
        let hash = self.hash();
        self.sent
            .lock()
            .unwrap()
            .push((chain.key.clone(), call.clone(), hash));
        if self.drop_send_replies.load(Ordering::SeqCst) {
            return Err(WriteError::Unconfirmed {
                tx_hash: hash,
                reason: "connection reset by peer".to_string(),
            });
        }
        Ok(hash)
    }
}

/// Quoter with a canned answer
pub struct FakeQuoter {
    answer: Result<Quote, NoRoute>,
    calls: AtomicUsize,
    last: Mutex<Option<QuoteRequest>>,
}

impl FakeQuoter {
    pub fn with_quote(quote: Quote) -> Self {
        Self {
            answer: Ok(quote),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn no_route(reason: &str) -> Self {
        Self {
            answer: Err(NoRoute::new(reason)),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<QuoteRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteQuoter for FakeQuoter {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, NoRoute> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        self.answer.clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Policy with a canned answer
pub struct FakePolicy {
    answer: Result<Value, DecisionError>,
    calls: AtomicUsize,
}

impl FakePolicy {
    pub fn answering(answer: Value) -> Self {
        Self {
            answer: Ok(answer),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: DecisionError) -> Self {
        Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionPolicy for FakePolicy {
    async fn decide(&self, _report: &BalanceReport, _capital_usd: f64) -> Result<Value, DecisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
