//! USD price resolution and attachment.
//!
//! A batch source is always tried first; a per-token fallback source is
//! consulted only for the tokens the batch missed. Tokens neither source
//! can price stay unpriced, and a position's USD value is left undefined
//! rather than reported as zero.

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use lpscope_api::{DefiLlamaClient, DexScreenerClient};

use crate::position::PositionInfo;
use crate::token_cache::TokenKey;

/// Batch price source, the preferred path.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Resolve USD prices for many tokens at once. Unknown tokens are
    /// omitted, not zeroed.
    async fn prices(&self, tokens: &[TokenKey]) -> Result<HashMap<TokenKey, f64>>;
}

/// Single-token fallback price source.
#[async_trait]
pub trait FallbackPriceSource: Send + Sync {
    async fn price(&self, chain_id: u64, token: Address) -> Result<Option<f64>>;
}

#[async_trait]
impl PriceLookup for DefiLlamaClient {
    async fn prices(&self, tokens: &[TokenKey]) -> Result<HashMap<TokenKey, f64>> {
        self.fetch_prices(tokens).await
    }
}

#[async_trait]
impl FallbackPriceSource for DexScreenerClient {
    async fn price(&self, chain_id: u64, token: Address) -> Result<Option<f64>> {
        self.fetch_price(chain_id, token).await
    }
}

/// Resolves prices for a position set and attaches them in place.
pub struct PriceMerger {
    batch: Arc<dyn PriceLookup>,
    fallback: Arc<dyn FallbackPriceSource>,
}

impl PriceMerger {
    pub fn new(batch: Arc<dyn PriceLookup>, fallback: Arc<dyn FallbackPriceSource>) -> Self {
        Self { batch, fallback }
    }

    /// Price every distinct pool token across `positions` and attach the
    /// results. A failed batch lookup degrades to the fallback path for
    /// all tokens instead of aborting the merge.
    pub async fn attach(&self, positions: &mut [PositionInfo]) {
        let tokens: Vec<TokenKey> = positions
            .iter()
            .flat_map(|p| {
                [
                    (p.chain_id, p.pool.token0.address),
                    (p.chain_id, p.pool.token1.address),
                ]
            })
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if tokens.is_empty() {
            return;
        }

        let mut prices = match self.batch.prices(&tokens).await {
            Ok(prices) => prices,
            Err(err) => {
                warn!(error = %err, "batch price lookup failed");
                HashMap::new()
            }
        };

        let mut fallback_hits = 0usize;
        for &(chain_id, token) in &tokens {
            if prices.contains_key(&(chain_id, token)) {
                continue;
            }
            match self.fallback.price(chain_id, token).await {
                Ok(Some(price)) => {
                    prices.insert((chain_id, token), price);
                    fallback_hits += 1;
                }
                Ok(None) => {
                    debug!(chain_id, token = %token, "token unpriced by both sources");
                }
                Err(err) => {
                    warn!(chain_id, token = %token, error = %err, "fallback price lookup failed");
                }
            }
        }

        debug!(
            tokens = tokens.len(),
            priced = prices.len(),
            fallback_hits,
            "price merge complete"
        );

        for position in positions {
            let price0 = prices
                .get(&(position.chain_id, position.pool.token0.address))
                .copied();
            let price1 = prices
                .get(&(position.chain_id, position.pool.token1.address))
                .copied();
            position.set_prices(price0, price1);
        }
    }
}
