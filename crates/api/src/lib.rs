//! HTTP clients for external price services.
//!
//! This crate provides:
//! - DefiLlama: batch USD prices across chains, the primary source
//! - DexScreener: per-token fallback quotes from DEX pair data

mod defillama;
mod dexscreener;

pub use defillama::{CoinPrice, DefiLlamaClient, PricesResponse};
pub use dexscreener::{DexScreenerClient, PairData, TokensResponse};
