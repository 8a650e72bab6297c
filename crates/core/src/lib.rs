//! LP position aggregation core.
//!
//! This crate provides the engine behind multi-chain LP position views:
//! - Position model with range/closed flags and amount math
//! - Durable token metadata and pool address caches
//! - TTL-based position cache with focus-gated refresh
//! - Multi-chain aggregation orchestrator
//! - Background fee enrichment and USD price merging
//!
//! Chain access goes through `lpscope-chain`; price HTTP clients live in
//! `lpscope-api`.

pub mod config;
mod fees;
mod orchestrator;
mod pool_cache;
mod position;
mod position_cache;
mod prices;
mod storage;
mod token_cache;

pub use config::{ChainSettings, EngineConfig, SeedToken};
pub use fees::{enrich_fees, FeeLedger};
pub use orchestrator::MultiChainPositionOrchestrator;
pub use pool_cache::PoolAddressCache;
pub use position::{PoolSnapshot, PositionDetails, PositionInfo, PositionKey};
pub use position_cache::{
    AlwaysFocused, CachedPositions, FocusSignal, PositionCache, DEFAULT_TTL,
};
pub use prices::{FallbackPriceSource, PriceLookup, PriceMerger};
pub use storage::{JsonFileStore, KvStore, MemoryStore};
pub use token_cache::{TokenMetadata, TokenMetadataCache, TokenKey, DEFAULT_DECIMALS};
