//! DexScreener API client, the per-token fallback price source.
//!
//! Consulted one token at a time for tokens the batch source missed.
//! Prices are read off the deepest matching pair, since thin pools
//! quote unreliable prices.

use alloy::primitives::Address;
use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Map a chain id to DexScreener's chain identifier.
pub fn chain_slug(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        56 => Some("bsc"),
        137 => Some("polygon"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        43114 => Some("avalanche"),
        _ => None,
    }
}

/// DexScreener API client.
#[derive(Debug, Clone)]
pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.dexscreener.com".to_string(),
        }
    }

    /// Create a client with custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the USD price of one token, or `None` if no pair on the
    /// given chain quotes it as base token.
    #[instrument(skip(self), fields(chain_id, token = %token))]
    pub async fn fetch_price(&self, chain_id: u64, token: Address) -> Result<Option<f64>> {
        let Some(slug) = chain_slug(chain_id) else {
            return Ok(None);
        };

        let url = format!("{}/latest/dex/tokens/{:#x}", self.base_url, token);
        let response = self.client.get(&url).send().await?;
        let data: TokensResponse = response.json().await?;

        let price = best_pair_price(&data, slug, token);
        debug!(found = price.is_some(), "fallback price lookup");
        Ok(price)
    }
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the price from the deepest pair on `slug` whose base token is
/// the one asked about.
fn best_pair_price(data: &TokensResponse, slug: &str, token: Address) -> Option<f64> {
    data.pairs
        .iter()
        .filter(|pair| pair.chain_id == slug)
        .filter(|pair| {
            pair.base_token
                .address
                .parse::<Address>()
                .map(|a| a == token)
                .unwrap_or(false)
        })
        .filter_map(|pair| {
            let price: f64 = pair.price_usd.as_deref()?.parse().ok()?;
            let depth = pair.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            Some((depth, price))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

/// Response wrapper for the tokens endpoint.
#[derive(Debug, Deserialize)]
pub struct TokensResponse {
    /// Explicitly `null` for unknown tokens, not just absent.
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub pairs: Vec<PairData>,
}

/// One trading pair quoting the token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairData {
    pub chain_id: String,
    pub base_token: PairToken,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Option<PairLiquidity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairToken {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairLiquidity {
    #[serde(default)]
    pub usd: f64,
}

// Custom deserializers

fn deserialize_null_as_empty<'de, D>(deserializer: D) -> Result<Vec<PairData>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<PairData>>::deserialize(deserializer)?.unwrap_or_default())
}
