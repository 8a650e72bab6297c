//! Chain interaction layer.
//!
//! This crate provides:
//! - `sol!` bindings for Multicall3, the position manager, pools, and
//!   ERC-20 metadata (string and bytes32 forms)
//! - The chunked batch fetcher with failure-driven splitting
//! - CREATE2 pool address derivation
//! - Per-chain contexts bundling addresses and the fetcher
//!
//! Supports multiple EVM chains with configurable RPC endpoints.

pub mod contracts;
mod context;
mod multicall;
mod pool_address;

pub use context::ChainContext;
pub use multicall::{
    is_capacity_error, BatchCall, BatchError, BatchExecutor, CallOutcome, CapacityClassifier,
    ChunkedBatchFetcher, MulticallExecutor, DEFAULT_CALL_GAS,
};
pub use pool_address::{compute_pool_address, sort_tokens, POOL_INIT_CODE_HASH};
