//! lpscope
//!
//! Multi-chain LP position viewer. Aggregates one account's
//! concentrated-liquidity positions across every configured chain:
//! - Batched reads through Multicall3 with adaptive chunking
//! - Durable token metadata and pool address caches
//! - Background fee enrichment and USD price merging

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lpscope_api::{DefiLlamaClient, DexScreenerClient};
use lpscope_chain::ChainContext;
use lpscope_core::{
    AlwaysFocused, EngineConfig, JsonFileStore, KvStore, MultiChainPositionOrchestrator,
    PoolAddressCache, PositionCache, PriceMerger, TokenMetadata, TokenMetadataCache,
};

/// Environment variable names.
mod env {
    pub const ACCOUNT: &str = "ACCOUNT";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lpscope_core=debug,lpscope_chain=debug")),
        )
        .init();

    info!("Starting lpscope");

    let account: alloy::primitives::Address = std::env::var(env::ACCOUNT)
        .map_err(|_| anyhow::anyhow!("Missing env var: {}", env::ACCOUNT))?
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid account address: {}", e))?;

    let config = EngineConfig::load()?;

    // Durable stores
    let token_store: Arc<dyn KvStore> =
        Arc::new(JsonFileStore::open(config.data_dir.join("tokens.json"))?);
    let pool_store: Arc<dyn KvStore> =
        Arc::new(JsonFileStore::open(config.data_dir.join("pools.json"))?);

    let tokens = Arc::new(TokenMetadataCache::new(token_store.clone()));
    let pools = Arc::new(PoolAddressCache::new(pool_store.clone()));

    // Chain contexts; chains without a resolvable RPC endpoint are skipped
    let mut chains = Vec::new();
    for settings in &config.chains {
        let Some(rpc_url) = settings.rpc_url() else {
            warn!(chain = %settings.name, "no RPC endpoint configured, skipping");
            continue;
        };

        tokens.seed(
            settings.chain_id,
            &settings
                .tokens
                .iter()
                .filter_map(|t| {
                    Some(TokenMetadata {
                        address: t.address.parse().ok()?,
                        decimals: t.decimals,
                        symbol: Some(t.symbol.clone()),
                        name: t.name.clone(),
                    })
                })
                .collect::<Vec<_>>(),
        );

        let chain = Arc::new(ChainContext::new(
            settings.chain_id,
            settings.name.clone(),
            rpc_url,
            settings.position_manager()?,
            settings.factory()?,
            settings.pool_init_code_hash()?,
        )?);

        if let Err(err) = chain.verify_connection().await {
            warn!(chain = %chain.name, error = %err, "chain unreachable, keeping anyway");
        }
        chains.push(chain);
    }

    if chains.is_empty() {
        anyhow::bail!("no chains configured; set at least one RPC endpoint");
    }
    info!(chains = chains.len(), "chain contexts initialized");

    // Price sources
    let prices = Arc::new(PriceMerger::new(
        Arc::new(DefiLlamaClient::new()),
        Arc::new(DexScreenerClient::new()),
    ));

    let orchestrator = Arc::new(
        MultiChainPositionOrchestrator::new(
            chains,
            tokens,
            pools,
            PositionCache::new(config.cache_ttl()),
            Arc::new(AlwaysFocused),
        )
        .with_prices(prices),
    );

    let positions = orchestrator.positions(account).await;
    info!(account = %account, positions = positions.len(), "aggregation finished");

    for position in positions.iter() {
        let (amount0, amount1) = position.amounts();
        info!(
            chain_id = position.chain_id,
            token_id = %position.details.token_id,
            pool = %position.pool.address,
            token0 = position.pool.token0.symbol.as_deref().unwrap_or("?"),
            token1 = position.pool.token1.symbol.as_deref().unwrap_or("?"),
            fee = position.details.fee,
            in_range = position.in_range,
            closed = position.closed,
            amount0,
            amount1,
            value_usd = position.value_usd,
            "position"
        );
    }

    // Persist what this run resolved
    token_store.flush()?;
    pool_store.flush()?;

    Ok(())
}
