//! Chat-completion decision policy
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (Groq by
//! default) in JSON mode. The prompt lists the chain keys and token symbols
//! the registry actually knows about so the model has no reason to invent
//! others; the answer is still validated downstream.

use super::{DecisionError, DecisionPolicy};
use crate::config::ChainRegistry;
use crate::scanner::BalanceReport;
use crate::tokens::TokenSymbol;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Decision policy backed by a hosted language model
pub struct ChatCompletionPolicy {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    timeout: Duration,
    rules: Vec<String>,
    registry: Arc<ChainRegistry>,
}

impl ChatCompletionPolicy {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: SecretString,
        timeout: Duration,
        rules: Vec<String>,
        registry: Arc<ChainRegistry>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            timeout,
            rules,
            registry,
        })
    }

    fn prompt(&self, report: &BalanceReport, capital_usd: f64) -> String {
        build_prompt(&self.registry, &self.rules, report, capital_usd)
    }
}

/// Render the prompt sent to the model
pub(crate) fn build_prompt(
    registry: &ChainRegistry,
    rules: &[String],
    report: &BalanceReport,
    capital_usd: f64,
) -> String {
    let chains = registry
        .chains()
        .iter()
        .map(|c| format!("\"{}\" ({})", c.key, c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut symbols: Vec<TokenSymbol> = Vec::new();
    for chain in registry.chains() {
        for token in chain.erc20_tokens() {
            if !symbols.contains(&token.symbol) {
                symbols.push(token.symbol);
            }
        }
    }
    let tokens = symbols
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(", ");

    let rules = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect::<Vec<_>>()
        .join("\n");

    let state = serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You are a cross-chain liquidity manager.\n\
         Capital under management: {capital_usd} USD.\n\
         Current state of vaults: {state}\n\n\
         Available chain keys: {chains}.\n\
         Available tokens: {tokens}.\n\n\
         Rules:\n{rules}\n\n\
         Return ONLY a JSON object. To move funds:\n\
         {{\"action\": \"SWAP\", \"fromChain\": \"<key>\", \"targetChain\": \"<key>\", \
         \"sourceToken\": \"<symbol>\", \"targetToken\": \"<symbol>\", \"amount\": \"<decimal>\", \
         \"reason\": \"<why>\", \"vaultAddress\": \"<0x...>\"}}\n\
         To do nothing:\n\
         {{\"action\": \"WAIT\", \"reason\": \"<why>\"}}"
    )
}

#[async_trait]
impl DecisionPolicy for ChatCompletionPolicy {
    async fn decide(
        &self,
        report: &BalanceReport,
        capital_usd: f64,
    ) -> std::result::Result<Value, DecisionError> {
        let prompt = self.prompt(report, capital_usd);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Requesting decision");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DecisionError::Timeout(self.timeout)
                } else {
                    DecisionError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecisionError::Http(format!("status {}", status)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DecisionError::Malformed("response has no content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| DecisionError::Malformed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "chat_completion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry_two_chains;
    use httpmock::prelude::*;

    fn policy(server: &MockServer) -> ChatCompletionPolicy {
        ChatCompletionPolicy::new(
            &server.base_url(),
            "test-model",
            SecretString::from("sk-test".to_string()),
            Duration::from_secs(5),
            vec!["Move idle USDC.".to_string()],
            Arc::new(registry_two_chains()),
        )
        .unwrap()
    }

    fn completion(content: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_decide_parses_json_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_contains("json_object");
            then.status(200).json_body(completion(
                r#"{"action":"SWAP","fromChain":"A","targetChain":"B","sourceToken":"USDC","targetToken":"USDC","amount":"10","reason":"idle"}"#,
            ));
        });

        let decision = policy(&server)
            .decide(&BalanceReport::default(), 1000.0)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(decision["action"], "SWAP");
        assert_eq!(decision["amount"], "10");
    }

    #[tokio::test]
    async fn test_unparseable_content_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("I think you should swap"));
        });

        let err = policy(&server)
            .decide(&BalanceReport::default(), 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let err = policy(&server)
            .decide(&BalanceReport::default(), 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Http(msg) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let err = policy(&server)
            .decide(&BalanceReport::default(), 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Malformed(_)));
    }

    #[test]
    fn test_prompt_lists_registry_keys_and_rules() {
        let registry = registry_two_chains();
        let prompt = build_prompt(
            &registry,
            &["Keep USDC on A.".to_string()],
            &BalanceReport::default(),
            250.0,
        );
        assert!(prompt.contains("\"A\""));
        assert!(prompt.contains("\"B\""));
        assert!(prompt.contains("\"USDC\", \"WETH\""));
        assert!(!prompt.contains("\"ETH\""));
        assert!(prompt.contains("1. Keep USDC on A."));
        assert!(prompt.contains("250"));
    }
}
