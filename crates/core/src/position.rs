//! Position data structures for reconstructed liquidity positions.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::token_cache::TokenMetadata;

/// Raw on-chain position record, as read from the position manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionDetails {
    /// NFT token id of the position.
    pub token_id: U256,
    /// First token of the pair (lower address).
    pub token0: Address,
    /// Second token of the pair.
    pub token1: Address,
    /// Fee tier in hundredths of a bip (500, 3000, 10000).
    pub fee: u32,
    /// Lower tick bound of the range.
    pub tick_lower: i32,
    /// Upper tick bound of the range.
    pub tick_upper: i32,
    /// Current liquidity of the position.
    pub liquidity: u128,
}

/// Current state of the pool a position belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Derived pool address.
    pub address: Address,
    /// Resolved metadata for token0.
    pub token0: TokenMetadata,
    /// Resolved metadata for token1.
    pub token1: TokenMetadata,
    /// Fee tier in hundredths of a bip.
    pub fee: u32,
    /// Current sqrt price, Q64.96.
    pub sqrt_price_x96: U256,
    /// Current tick.
    pub tick: i32,
}

/// Identity key for a position: unique across all chains.
pub type PositionKey = (u64, U256);

/// A fully assembled liquidity position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Wallet that owns the position.
    pub owner: Address,
    /// Chain the position lives on.
    pub chain_id: u64,
    /// State of the pool the position is in.
    pub pool: PoolSnapshot,
    /// Raw on-chain record.
    pub details: PositionDetails,
    /// Whether the pool's current tick is inside the position's range.
    pub in_range: bool,
    /// Whether all liquidity has been withdrawn.
    pub closed: bool,
    /// Uncollected fees (token0, token1), raw units. None until the fee
    /// enricher has run for this position.
    pub fees: Option<(U256, U256)>,
    /// USD prices per whole token (token0, token1). None until the price
    /// merger has run.
    pub prices: Option<(f64, f64)>,
    /// USD value estimate of the position's principal.
    pub value_usd: Option<f64>,
}

impl PositionInfo {
    /// Assemble a position, deriving the `closed` and `in_range` flags
    /// from the raw record and pool state.
    pub fn assemble(
        owner: Address,
        chain_id: u64,
        pool: PoolSnapshot,
        details: PositionDetails,
    ) -> Self {
        let closed = details.liquidity == 0;
        // Lower bound inclusive, upper bound exclusive.
        let in_range = pool.tick >= details.tick_lower && pool.tick < details.tick_upper;

        Self {
            owner,
            chain_id,
            pool,
            details,
            in_range,
            closed,
            fees: None,
            prices: None,
            value_usd: None,
        }
    }

    /// Identity key: `(chain_id, token_id)`.
    pub fn key(&self) -> PositionKey {
        (self.chain_id, self.details.token_id)
    }

    /// Principal amounts of (token0, token1) in whole-token units.
    ///
    /// Display precision only: f64 sqrt-price math, not the exact Q96
    /// integer math the pool uses for settlement.
    pub fn amounts(&self) -> (f64, f64) {
        let (raw0, raw1) = raw_amounts(
            self.details.liquidity,
            self.pool.sqrt_price_x96,
            self.details.tick_lower,
            self.details.tick_upper,
        );
        (
            raw0 / 10f64.powi(self.pool.token0.decimals as i32),
            raw1 / 10f64.powi(self.pool.token1.decimals as i32),
        )
    }

    /// Attach merged prices and the resulting value estimate.
    pub fn set_prices(&mut self, price0: Option<f64>, price1: Option<f64>) {
        let (amount0, amount1) = self.amounts();
        match (price0, price1) {
            (Some(p0), Some(p1)) => {
                self.prices = Some((p0, p1));
                self.value_usd = Some(amount0 * p0 + amount1 * p1);
            }
            _ => {
                self.prices = None;
                self.value_usd = None;
            }
        }
    }
}

/// Sqrt of the price at a tick: 1.0001^(tick/2).
fn sqrt_price_at_tick(tick: i32) -> f64 {
    1.0001f64.powf(tick as f64 / 2.0)
}

/// Raw token amounts backing `liquidity` over `[tick_lower, tick_upper)`
/// at the pool's current sqrt price.
fn raw_amounts(liquidity: u128, sqrt_price_x96: U256, tick_lower: i32, tick_upper: i32) -> (f64, f64) {
    if liquidity == 0 {
        return (0.0, 0.0);
    }

    let liquidity = liquidity as f64;
    // U256 -> f64 via string; sqrtPriceX96 is uint160 and can overflow u128.
    let sqrt_price = sqrt_price_x96.to_string().parse::<f64>().unwrap_or(0.0) / 2f64.powi(96);
    let sqrt_lower = sqrt_price_at_tick(tick_lower);
    let sqrt_upper = sqrt_price_at_tick(tick_upper);

    // Clamping the current price into the range collapses the three
    // in/below/above-range cases into one formula.
    let sqrt_clamped = sqrt_price.clamp(sqrt_lower, sqrt_upper);

    let amount0 = liquidity * (1.0 / sqrt_clamped - 1.0 / sqrt_upper);
    let amount1 = liquidity * (sqrt_clamped - sqrt_lower);
    (amount0.max(0.0), amount1.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(addr: u8, decimals: u8) -> TokenMetadata {
        TokenMetadata {
            address: Address::repeat_byte(addr),
            decimals,
            symbol: Some(format!("T{addr}")),
            name: None,
        }
    }

    fn position(tick: i32, tick_lower: i32, tick_upper: i32, liquidity: u128) -> PositionInfo {
        let details = PositionDetails {
            token_id: U256::from(1),
            token0: Address::repeat_byte(1),
            token1: Address::repeat_byte(2),
            fee: 3000,
            tick_lower,
            tick_upper,
            liquidity,
        };
        let pool = PoolSnapshot {
            address: Address::repeat_byte(9),
            token0: token(1, 18),
            token1: token(2, 6),
            fee: 3000,
            sqrt_price_x96: U256::from(1u128) << 96,
            tick,
        };
        PositionInfo::assemble(Address::repeat_byte(0xAA), 1, pool, details)
    }

    #[test]
    fn closed_iff_zero_liquidity() {
        assert!(position(0, -100, 100, 0).closed);
        assert!(!position(0, -100, 100, 1).closed);
    }

    #[test]
    fn in_range_bounds() {
        // Inside the range.
        assert!(position(0, -100, 100, 1).in_range);
        // Lower bound is inclusive.
        assert!(position(-100, -100, 100, 1).in_range);
        // Upper bound is exclusive.
        assert!(!position(100, -100, 100, 1).in_range);
        // Outside on either side.
        assert!(!position(-101, -100, 100, 1).in_range);
        assert!(!position(500, -100, 100, 1).in_range);
    }

    #[test]
    fn amounts_zero_when_closed() {
        let pos = position(0, -100, 100, 0);
        assert_eq!(pos.amounts(), (0.0, 0.0));
    }

    #[test]
    fn amounts_one_sided_when_out_of_range() {
        // Price below the range: all value sits in token0.
        let below = position(-5000, -100, 100, 10u128.pow(18));
        let pool_below = PoolSnapshot {
            sqrt_price_x96: U256::from((sqrt_price_at_tick(-5000) * 2f64.powi(96)) as u128),
            ..below.pool.clone()
        };
        let below = PositionInfo::assemble(below.owner, 1, pool_below, below.details);
        let (a0, a1) = below.amounts();
        assert!(a0 > 0.0);
        assert_eq!(a1, 0.0);

        // Price above the range: all value sits in token1.
        let above = position(5000, -100, 100, 10u128.pow(18));
        let pool_above = PoolSnapshot {
            sqrt_price_x96: U256::from((sqrt_price_at_tick(5000) * 2f64.powi(96)) as u128),
            ..above.pool.clone()
        };
        let above = PositionInfo::assemble(above.owner, 1, pool_above, above.details);
        let (a0, a1) = above.amounts();
        assert_eq!(a0, 0.0);
        assert!(a1 > 0.0);
    }

    #[test]
    fn value_requires_both_prices() {
        let mut pos = position(0, -100, 100, 10u128.pow(18));
        pos.set_prices(Some(1.0), None);
        assert!(pos.value_usd.is_none());

        pos.set_prices(Some(2.0), Some(3.0));
        let (a0, a1) = pos.amounts();
        let expected = a0 * 2.0 + a1 * 3.0;
        assert!((pos.value_usd.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn identity_key() {
        let pos = position(0, -100, 100, 1);
        assert_eq!(pos.key(), (1, U256::from(1)));
    }
}
