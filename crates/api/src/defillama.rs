//! DefiLlama price API client, the primary USD price source.
//!
//! One request resolves prices for many tokens across many chains, so
//! this is always tried first; tokens the API does not know are simply
//! absent from the response and left for the fallback source.

use alloy::primitives::Address;
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Map a chain id to the slug DefiLlama keys coins by.
pub fn chain_slug(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        56 => Some("bsc"),
        137 => Some("polygon"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        43114 => Some("avax"),
        _ => None,
    }
}

/// DefiLlama coins API client.
#[derive(Debug, Clone)]
pub struct DefiLlamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl DefiLlamaClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://coins.llama.fi".to_string(),
        }
    }

    /// Create a client with custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch current USD prices for a batch of tokens.
    ///
    /// Tokens on chains DefiLlama has no slug for, and tokens the API
    /// does not track, are omitted from the result rather than reported
    /// as zero.
    #[instrument(skip(self, tokens), fields(requested = tokens.len()))]
    pub async fn fetch_prices(
        &self,
        tokens: &[(u64, Address)],
    ) -> Result<HashMap<(u64, Address), f64>> {
        let mut coin_keys = Vec::with_capacity(tokens.len());
        let mut requested = Vec::with_capacity(tokens.len());
        for &(chain_id, address) in tokens {
            let Some(slug) = chain_slug(chain_id) else {
                warn!(chain_id, "no price feed slug for chain");
                continue;
            };
            coin_keys.push(format!("{slug}:{address:#x}"));
            requested.push((chain_id, address));
        }

        if coin_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/prices/current/{}",
            self.base_url,
            coin_keys.join(",")
        );
        let response = self.client.get(&url).send().await?;
        let data: PricesResponse = response.json().await?;

        let mut prices = HashMap::new();
        for (key, (chain_id, address)) in coin_keys.iter().zip(requested) {
            if let Some(coin) = data.coins.get(key) {
                prices.insert((chain_id, address), coin.price);
            }
        }

        debug!(
            requested = coin_keys.len(),
            resolved = prices.len(),
            "fetched batch prices"
        );
        Ok(prices)
    }
}

impl Default for DefiLlamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Response wrapper keyed by `{chain}:{address}`.
#[derive(Debug, Deserialize)]
pub struct PricesResponse {
    #[serde(default)]
    pub coins: HashMap<String, CoinPrice>,
}

/// One priced coin.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinPrice {
    pub price: f64,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub confidence: Option<f64>,
}
