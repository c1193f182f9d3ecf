//! LI.FI bridge aggregator client
//!
//! Plain transfers use `GET /quote`. When a destination callback is attached
//! a plain quote first prices the delivery, then `POST /quote/contractCalls`
//! asks for a route whose vault call spends the guaranteed destination
//! amount (`toAmountMin`) in the destination token's units.
//!
//! SECURITY NOTE:
//! - This client only prepares transactions, it never signs them
//! - It has no access to key material

use super::{DestinationCall, NoRoute, Quote, QuoteRequest, RouteQuoter};
use crate::config::BridgeSettings;
use crate::Result;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiQuote {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    estimate: Option<LifiEstimate>,
    #[serde(default)]
    transaction_request: Option<LifiTransaction>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    #[serde(default)]
    to_amount: Option<String>,
    #[serde(default)]
    to_amount_min: Option<String>,
    #[serde(default)]
    approval_address: Option<String>,
    #[serde(default)]
    fee_costs: Vec<LifiFee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiFee {
    #[serde(default, rename = "amountUSD")]
    amount_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransaction {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas_limit: Option<String>,
}

/// Route quoter backed by the LI.FI REST API
pub struct LifiQuoter {
    client: Client,
    base_url: String,
    timeout: Duration,
    integrator: Option<String>,
    slippage: Option<f64>,
}

impl LifiQuoter {
    pub fn new(settings: &BridgeSettings) -> Result<Self> {
        let timeout = settings.quote_timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout,
            integrator: settings.integrator.clone(),
            slippage: settings.slippage,
        })
    }

    fn plain_request(&self, request: &QuoteRequest) -> RequestBuilder {
        let mut params = vec![
            ("fromChain", request.from_chain_id.to_string()),
            ("toChain", request.to_chain_id.to_string()),
            ("fromToken", request.from_token.to_string()),
            ("toToken", request.to_token.to_string()),
            ("fromAmount", request.amount.to_string()),
            ("fromAddress", request.sender.to_string()),
            ("toAddress", request.recipient.to_string()),
        ];
        if let Some(integrator) = &self.integrator {
            params.push(("integrator", integrator.clone()));
        }
        if let Some(slippage) = self.slippage {
            params.push(("slippage", slippage.to_string()));
        }
        self.client
            .get(format!("{}/quote", self.base_url))
            .query(&params)
    }

    /// `delivered` is the destination-token amount the vault call receives
    fn contract_call_request(
        &self,
        request: &QuoteRequest,
        call: &DestinationCall,
        delivered: U256,
    ) -> RequestBuilder {
        let mut body = json!({
            "fromChain": request.from_chain_id,
            "toChain": request.to_chain_id,
            "fromToken": request.from_token.to_string(),
            "toToken": request.to_token.to_string(),
            "fromAmount": request.amount.to_string(),
            "fromAddress": request.sender.to_string(),
            "toFallbackAddress": request.recipient.to_string(),
            "contractCalls": [{
                "fromAmount": delivered.to_string(),
                "fromTokenAddress": request.to_token.to_string(),
                "toContractAddress": call.target.to_string(),
                "toContractCallData": call.data.to_string(),
                "toContractGasLimit": call.gas_limit.to_string(),
            }],
        });
        if let Some(integrator) = &self.integrator {
            body["integrator"] = json!(integrator);
        }
        if let Some(slippage) = self.slippage {
            body["slippage"] = json!(slippage);
        }
        self.client
            .post(format!("{}/quote/contractCalls", self.base_url))
            .json(&body)
    }

    async fn fetch(&self, builder: RequestBuilder) -> std::result::Result<LifiQuote, NoRoute> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NoRoute::new(format!("quote request timed out after {:?}", self.timeout))
            } else {
                NoRoute::new(format!("quote request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NoRoute::new(format!("failed to read quote body: {}", e)))?;

        if !status.is_success() {
            return Err(NoRoute::new(format!(
                "quote rejected with status {}: {}",
                status,
                error_message(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| NoRoute::new(format!("unparseable quote: {}", e)))
    }
}

/// Guaranteed destination amount of a plain quote, falling back to the estimate
fn delivered_amount(raw: &LifiQuote) -> Option<U256> {
    let estimate = raw.estimate.as_ref()?;
    estimate
        .to_amount_min
        .as_deref()
        .or(estimate.to_amount.as_deref())
        .and_then(parse_quantity)
        .filter(|amount| !amount.is_zero())
}

/// Parse a hex (`0x`-prefixed) or decimal quantity
fn parse_quantity(raw: &str) -> Option<U256> {
    U256::from_str(raw.trim()).ok()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn into_quote(raw: LifiQuote) -> std::result::Result<Quote, NoRoute> {
    let Some(tx) = raw.transaction_request else {
        return Err(NoRoute::new(
            raw.message
                .unwrap_or_else(|| "quote has no transaction request".to_string()),
        ));
    };

    let to = tx
        .to
        .as_deref()
        .and_then(|s| Address::from_str(s.trim()).ok())
        .filter(|a| !a.is_zero())
        .ok_or_else(|| NoRoute::new("quote has no usable call target"))?;
    let data = tx
        .data
        .as_deref()
        .and_then(|s| Bytes::from_str(s.trim()).ok())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| NoRoute::new("quote has no usable call data"))?;
    let value = match tx.value.as_deref() {
        Some(v) => parse_quantity(v).ok_or_else(|| NoRoute::new("quote has an invalid value"))?,
        None => U256::ZERO,
    };
    let gas_limit = tx
        .gas_limit
        .as_deref()
        .and_then(parse_quantity)
        .and_then(|g| u64::try_from(g).ok());

    let estimate = raw.estimate;
    let spender = estimate
        .as_ref()
        .and_then(|e| e.approval_address.as_deref())
        .and_then(|s| Address::from_str(s.trim()).ok())
        .filter(|a| !a.is_zero())
        .unwrap_or(to);
    let to_amount = estimate.as_ref().and_then(|e| e.to_amount.clone());
    let fee_usd = estimate.as_ref().and_then(|e| {
        let fees: Vec<f64> = e
            .fee_costs
            .iter()
            .filter_map(|f| f.amount_usd.as_deref()?.parse().ok())
            .collect();
        (!fees.is_empty()).then(|| format!("{:.2}", fees.iter().sum::<f64>()))
    });

    Ok(Quote {
        to,
        data,
        value,
        gas_limit,
        tool: raw.tool.unwrap_or_else(|| "unknown".to_string()),
        to_amount,
        fee_usd,
        spender,
    })
}

#[async_trait]
impl RouteQuoter for LifiQuoter {
    async fn quote(&self, request: &QuoteRequest) -> std::result::Result<Quote, NoRoute> {
        tracing::info!(
            from_chain = request.from_chain_id,
            to_chain = request.to_chain_id,
            from_token = %request.from_token,
            to_token = %request.to_token,
            amount = %request.amount,
            contract_call = request.destination_call.is_some(),
            "Requesting bridge quote"
        );

        let raw = match &request.destination_call {
            None => self.fetch(self.plain_request(request)).await?,
            Some(call) => {
                let plain = self.fetch(self.plain_request(request)).await?;
                let delivered = delivered_amount(&plain).ok_or_else(|| {
                    NoRoute::new("quote has no destination amount for the contract call")
                })?;
                tracing::debug!(%delivered, "Destination amount for contract call");
                self.fetch(self.contract_call_request(request, call, delivered))
                    .await?
            }
        };
        let quote = into_quote(raw)?;

        tracing::info!(
            tool = %quote.tool,
            to = %quote.to,
            value = %quote.value,
            to_amount = ?quote.to_amount,
            fee_usd = ?quote.fee_usd,
            "Received bridge quote"
        );
        Ok(quote)
    }

    fn name(&self) -> &'static str {
        "lifi"
    }
}
