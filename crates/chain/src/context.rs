//! Per-chain handle bundling addresses and the batched-call fetcher.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::contracts::MULTICALL3;
use crate::multicall::{BatchExecutor, ChunkedBatchFetcher, MulticallExecutor};
use crate::pool_address::{compute_pool_address, POOL_INIT_CODE_HASH};

/// Everything the orchestrator needs to read one chain.
pub struct ChainContext {
    /// EVM chain id.
    pub chain_id: u64,
    /// Human-readable chain name for logs.
    pub name: String,
    /// NonfungiblePositionManager deployment on this chain.
    pub position_manager: Address,
    /// Pool factory deployment on this chain.
    pub factory: Address,
    /// Init code hash used for pool address derivation on this chain.
    pub pool_init_code_hash: B256,
    /// Batched-call fetcher for this chain.
    pub fetcher: ChunkedBatchFetcher,
    rpc_url: Option<String>,
}

impl ChainContext {
    /// Create a context backed by a Multicall3 executor over HTTP.
    /// Fails if the RPC URL does not parse.
    pub fn new(
        chain_id: u64,
        name: impl Into<String>,
        rpc_url: impl Into<String>,
        position_manager: Address,
        factory: Address,
        pool_init_code_hash: Option<B256>,
    ) -> Result<Self> {
        let rpc_url = rpc_url.into();
        let executor = Arc::new(MulticallExecutor::new(&rpc_url, MULTICALL3)?);
        Ok(Self {
            chain_id,
            name: name.into(),
            position_manager,
            factory,
            pool_init_code_hash: pool_init_code_hash.unwrap_or(POOL_INIT_CODE_HASH),
            fetcher: ChunkedBatchFetcher::new(executor),
            rpc_url: Some(rpc_url),
        })
    }

    /// Create a context with an injected executor. Used by tests.
    pub fn with_executor(
        chain_id: u64,
        name: impl Into<String>,
        position_manager: Address,
        factory: Address,
        executor: Arc<dyn BatchExecutor>,
    ) -> Self {
        Self {
            chain_id,
            name: name.into(),
            position_manager,
            factory,
            pool_init_code_hash: POOL_INIT_CODE_HASH,
            fetcher: ChunkedBatchFetcher::new(executor),
            rpc_url: None,
        }
    }

    /// Derive the pool address for a token pair and fee tier on this chain.
    pub fn pool_address(&self, token_a: Address, token_b: Address, fee: u32) -> Address {
        compute_pool_address(
            self.factory,
            token_a,
            token_b,
            fee,
            self.pool_init_code_hash,
        )
    }

    /// Verify the RPC endpoint answers. Failure here is not fatal to the
    /// engine; the chain simply contributes empty results until it does.
    pub async fn verify_connection(&self) -> Result<u64> {
        let url = self
            .rpc_url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("chain {} has no rpc url", self.name))?
            .parse()?;
        let provider = ProviderBuilder::new().on_http(url);
        let block = provider.get_block_number().await?;
        info!(chain = %self.name, block, "chain connection verified");
        Ok(block)
    }
}
