//! Multi-chain position aggregation pipeline.
//!
//! For each configured chain: count positions, enumerate token ids, read
//! raw position records, then resolve token metadata and pool state and
//! assemble the results. Chains run concurrently and fail independently;
//! a chain that errors contributes an empty list instead of poisoning
//! the whole refresh.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Result};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use lpscope_chain::contracts::{INonfungiblePositionManager, IUniswapV3Pool};
use lpscope_chain::{BatchCall, ChainContext};

use crate::fees::{enrich_fees, FeeLedger};
use crate::pool_cache::PoolAddressCache;
use crate::position::{PoolSnapshot, PositionDetails, PositionInfo};
use crate::position_cache::{FocusSignal, PositionCache};
use crate::prices::PriceMerger;
use crate::token_cache::{TokenMetadata, TokenMetadataCache};

type SharedRefresh = Shared<BoxFuture<'static, Arc<Vec<PositionInfo>>>>;

/// Aggregates one account's positions across every configured chain.
pub struct MultiChainPositionOrchestrator {
    chains: Vec<Arc<ChainContext>>,
    tokens: Arc<TokenMetadataCache>,
    pools: Arc<PoolAddressCache>,
    cache: PositionCache,
    fees: Arc<FeeLedger>,
    prices: Option<Arc<PriceMerger>>,
    focus: Arc<dyn FocusSignal>,
    refreshing: DashMap<Address, SharedRefresh>,
    deferred: DashMap<Address, ()>,
}

impl MultiChainPositionOrchestrator {
    pub fn new(
        chains: Vec<Arc<ChainContext>>,
        tokens: Arc<TokenMetadataCache>,
        pools: Arc<PoolAddressCache>,
        cache: PositionCache,
        focus: Arc<dyn FocusSignal>,
    ) -> Self {
        Self {
            chains,
            tokens,
            pools,
            cache,
            fees: Arc::new(FeeLedger::new()),
            prices: None,
            focus,
            refreshing: DashMap::new(),
            deferred: DashMap::new(),
        }
    }

    /// Attach a price merger; without one positions carry no USD values.
    pub fn with_prices(mut self, prices: Arc<PriceMerger>) -> Self {
        self.prices = Some(prices);
        self
    }

    /// The fee ledger populated by background enrichment.
    pub fn fee_ledger(&self) -> Arc<FeeLedger> {
        Arc::clone(&self.fees)
    }

    /// An account's positions, from cache when fresh enough.
    ///
    /// A stale entry is refreshed in line while the host has focus; when
    /// it does not, the stale data is returned as-is and one refresh is
    /// queued for the next foregrounding.
    pub async fn positions(self: &Arc<Self>, account: Address) -> Arc<Vec<PositionInfo>> {
        if let Some(entry) = self.cache.get(account) {
            if !entry.is_stale() {
                debug!(account = %account, "serving fresh cached positions");
                return entry.positions();
            }
            if !self.focus.has_focus() {
                debug!(account = %account, "stale but unfocused, deferring refresh");
                self.defer_refresh(account);
                return entry.positions();
            }
        }
        self.refresh(account).await
    }

    /// Force a refresh, deduplicated per account: concurrent callers
    /// share one in-flight aggregation.
    pub async fn refresh(self: &Arc<Self>, account: Address) -> Arc<Vec<PositionInfo>> {
        use dashmap::mapref::entry::Entry;

        let (shared, owner) = match self.refreshing.entry(account) {
            Entry::Occupied(pending) => (pending.get().clone(), false),
            Entry::Vacant(slot) => {
                let this = Arc::clone(self);
                let fut = async move { this.refresh_inner(account).await }
                    .boxed()
                    .shared();
                slot.insert(fut.clone());
                (fut, true)
            }
        };

        let result = shared.await;
        if owner {
            self.refreshing.remove(&account);
        }
        result
    }

    #[instrument(skip(self), fields(account = %account))]
    async fn refresh_inner(self: Arc<Self>, account: Address) -> Arc<Vec<PositionInfo>> {
        let per_chain = join_all(self.chains.iter().map(|chain| {
            let chain = Arc::clone(chain);
            let this = Arc::clone(&self);
            async move {
                match this.chain_positions(&chain, account).await {
                    Ok(positions) => positions,
                    Err(err) => {
                        warn!(chain = %chain.name, error = %err, "chain aggregation failed");
                        Vec::new()
                    }
                }
            }
        }))
        .await;

        let mut positions: Vec<PositionInfo> = per_chain.into_iter().flatten().collect();

        self.fees.apply(&mut positions);
        if let Some(prices) = &self.prices {
            prices.attach(&mut positions).await;
        }

        info!(account = %account, positions = positions.len(), "refresh complete");
        self.cache.set(account, positions)
    }

    /// One chain's full pipeline. Any batch-level failure propagates and
    /// is absorbed by the caller; per-position failures are dropped here
    /// with a diagnostic.
    async fn chain_positions(
        &self,
        chain: &Arc<ChainContext>,
        account: Address,
    ) -> Result<Vec<PositionInfo>> {
        let count = self.position_count(chain, account).await?;
        if count == 0 {
            debug!(chain = %chain.name, "account holds no positions");
            return Ok(Vec::new());
        }

        let token_ids = self.enumerate_ids(chain, account, count).await?;

        // Fee reads never gate assembly.
        tokio::spawn(enrich_fees(
            Arc::clone(chain),
            account,
            token_ids.clone(),
            Arc::clone(&self.fees),
        ));

        let details = self.position_details(chain, &token_ids).await?;

        let addresses: Vec<Address> = details
            .iter()
            .flat_map(|d| [d.token0, d.token1])
            .collect();
        let tokens = self.tokens.get_tokens(&addresses, chain).await;

        let pool_of = self.resolve_pools(chain, &details);
        let pool_states = self.pool_states(chain, &pool_of).await?;

        let mut positions = Vec::with_capacity(details.len());
        for detail in details {
            let Some(&pool_address) = pool_of.get(&(detail.token0, detail.token1, detail.fee))
            else {
                continue;
            };
            let Some(&(sqrt_price_x96, tick)) = pool_states.get(&pool_address) else {
                warn!(
                    chain = %chain.name,
                    token_id = %detail.token_id,
                    pool = %pool_address,
                    "dropping position without pool state"
                );
                continue;
            };

            let snapshot = PoolSnapshot {
                address: pool_address,
                token0: token_or_synthetic(&tokens, detail.token0),
                token1: token_or_synthetic(&tokens, detail.token1),
                fee: detail.fee,
                sqrt_price_x96,
                tick,
            };
            positions.push(PositionInfo::assemble(
                account,
                chain.chain_id,
                snapshot,
                detail,
            ));
        }

        info!(chain = %chain.name, positions = positions.len(), "chain aggregation complete");
        Ok(positions)
    }

    async fn position_count(&self, chain: &ChainContext, account: Address) -> Result<u64> {
        let call = BatchCall::new(
            chain.position_manager,
            INonfungiblePositionManager::balanceOfCall { owner: account }.abi_encode(),
        );
        let outcomes = chain.fetcher.fetch(vec![call]).await?;
        let raw = outcomes
            .first()
            .and_then(|o| o.data())
            .ok_or_else(|| anyhow!("position count unavailable"))?;
        let count =
            INonfungiblePositionManager::balanceOfCall::abi_decode_returns(raw, true)?._0;
        u64::try_from(count).map_err(|_| anyhow!("implausible position count {count}"))
    }

    async fn enumerate_ids(
        &self,
        chain: &ChainContext,
        account: Address,
        count: u64,
    ) -> Result<Vec<U256>> {
        let calls = (0..count)
            .map(|index| {
                BatchCall::new(
                    chain.position_manager,
                    INonfungiblePositionManager::tokenOfOwnerByIndexCall {
                        owner: account,
                        index: U256::from(index),
                    }
                    .abi_encode(),
                )
            })
            .collect();
        let outcomes = chain.fetcher.fetch(calls).await?;

        let mut ids = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.iter().enumerate() {
            let decoded = outcome.data().and_then(|d| {
                INonfungiblePositionManager::tokenOfOwnerByIndexCall::abi_decode_returns(d, true)
                    .ok()
            });
            match decoded {
                Some(ret) => ids.push(ret._0),
                None => warn!(chain = %chain.name, index, "dropping unreadable token id"),
            }
        }
        Ok(ids)
    }

    async fn position_details(
        &self,
        chain: &ChainContext,
        token_ids: &[U256],
    ) -> Result<Vec<PositionDetails>> {
        let calls = token_ids
            .iter()
            .map(|&token_id| {
                BatchCall::new(
                    chain.position_manager,
                    INonfungiblePositionManager::positionsCall { tokenId: token_id }.abi_encode(),
                )
            })
            .collect();
        let outcomes = chain.fetcher.fetch(calls).await?;

        let mut details = Vec::with_capacity(token_ids.len());
        for (&token_id, outcome) in token_ids.iter().zip(&outcomes) {
            let decoded = outcome.data().and_then(|d| {
                INonfungiblePositionManager::positionsCall::abi_decode_returns(d, true).ok()
            });
            match decoded {
                Some(ret) => details.push(PositionDetails {
                    token_id,
                    token0: ret.token0,
                    token1: ret.token1,
                    fee: ret.fee.to::<u32>(),
                    tick_lower: ret.tickLower.as_i32(),
                    tick_upper: ret.tickUpper.as_i32(),
                    liquidity: ret.liquidity,
                }),
                None => {
                    warn!(chain = %chain.name, token_id = %token_id, "dropping unreadable position record");
                }
            }
        }
        Ok(details)
    }

    /// Pool address per distinct (token0, token1, fee) triple, from the
    /// durable cache or derived and written through.
    fn resolve_pools(
        &self,
        chain: &ChainContext,
        details: &[PositionDetails],
    ) -> HashMap<(Address, Address, u32), Address> {
        let mut pool_of = HashMap::new();
        for detail in details {
            let key = (detail.token0, detail.token1, detail.fee);
            if pool_of.contains_key(&key) {
                continue;
            }
            let address = match self
                .pools
                .get(chain.chain_id, detail.token0, detail.token1, detail.fee)
            {
                Some(address) => address,
                None => {
                    let address = chain.pool_address(detail.token0, detail.token1, detail.fee);
                    self.pools.insert(
                        chain.chain_id,
                        detail.token0,
                        detail.token1,
                        detail.fee,
                        address,
                    );
                    address
                }
            };
            pool_of.insert(key, address);
        }
        pool_of
    }

    /// Batch slot0 over the distinct pools. Pools whose read fails are
    /// simply absent from the result map.
    async fn pool_states(
        &self,
        chain: &ChainContext,
        pool_of: &HashMap<(Address, Address, u32), Address>,
    ) -> Result<HashMap<Address, (U256, i32)>> {
        let mut pools: Vec<Address> = pool_of.values().copied().collect();
        pools.sort();
        pools.dedup();

        if pools.is_empty() {
            return Ok(HashMap::new());
        }

        let calls = pools
            .iter()
            .map(|&pool| BatchCall::new(pool, IUniswapV3Pool::slot0Call {}.abi_encode()))
            .collect();
        let outcomes = chain.fetcher.fetch(calls).await?;

        let mut states = HashMap::new();
        for (&pool, outcome) in pools.iter().zip(&outcomes) {
            let decoded = outcome
                .data()
                .and_then(|d| IUniswapV3Pool::slot0Call::abi_decode_returns(d, true).ok());
            match decoded {
                Some(ret) => {
                    states.insert(pool, (ret.sqrtPriceX96.to::<U256>(), ret.tick.as_i32()));
                }
                None => warn!(chain = %chain.name, pool = %pool, "pool state unavailable"),
            }
        }
        Ok(states)
    }

    /// Queue exactly one refresh for the next foregrounding.
    fn defer_refresh(self: &Arc<Self>, account: Address) {
        if self.deferred.insert(account, ()).is_some() {
            return;
        }
        let this = Arc::clone(self);
        self.focus.on_foregrounded(Box::new(move || {
            this.deferred.remove(&account);
            tokio::spawn(async move {
                this.refresh(account).await;
            });
        }));
    }
}

fn token_or_synthetic(tokens: &HashMap<Address, TokenMetadata>, address: Address) -> TokenMetadata {
    tokens
        .get(&address)
        .cloned()
        .unwrap_or_else(|| TokenMetadata::synthetic(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_cache::{AlwaysFocused, DEFAULT_TTL};
    use crate::storage::{KvStore, MemoryStore};
    use alloy::primitives::aliases::{I24, U24, U96};
    use alloy::primitives::{B256, U160};
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use lpscope_chain::contracts::{IErc20Metadata, IErc20MetadataBytes32};
    use lpscope_chain::{BatchError, BatchExecutor, CallOutcome};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const OWNER: Address = Address::repeat_byte(0xAA);

    /// One simulated position: a pair, a range and liquidity. Each
    /// position gets its own pool.
    #[derive(Clone)]
    struct SimPosition {
        token_id: u64,
        token0: Address,
        token1: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    }

    impl SimPosition {
        fn new(token_id: u64, pair: u8) -> Self {
            // token0 is shared across pairs, token1 distinguishes pools.
            Self {
                token_id,
                token0: Address::repeat_byte(0x10),
                token1: Address::repeat_byte(0x40 + pair),
                tick_lower: -600,
                tick_upper: 600,
                liquidity: 1_000_000_000_000,
            }
        }
    }

    /// Answers the whole read surface of one chain by call selector.
    struct ChainSim {
        positions: Vec<SimPosition>,
        broken_pools: Vec<Address>,
        balance_reads: AtomicUsize,
    }

    impl ChainSim {
        fn new(positions: Vec<SimPosition>) -> Self {
            Self {
                positions,
                broken_pools: Vec::new(),
                balance_reads: AtomicUsize::new(0),
            }
        }

        fn with_broken_pool(mut self, pool: Address) -> Self {
            self.broken_pools.push(pool);
            self
        }

        fn answer(&self, call: &BatchCall) -> CallOutcome {
            let selector: [u8; 4] = call.calldata[..4].try_into().expect("selector");
            let ok = |data: Vec<u8>| CallOutcome {
                success: true,
                return_data: data.into(),
            };
            let failed = CallOutcome {
                success: false,
                return_data: Vec::new().into(),
            };

            match selector {
                s if s == INonfungiblePositionManager::balanceOfCall::SELECTOR => {
                    self.balance_reads.fetch_add(1, Ordering::SeqCst);
                    ok(U256::from(self.positions.len()).abi_encode())
                }
                s if s == INonfungiblePositionManager::tokenOfOwnerByIndexCall::SELECTOR => {
                    let decoded = INonfungiblePositionManager::tokenOfOwnerByIndexCall::abi_decode(
                        &call.calldata,
                        true,
                    )
                    .expect("enumerate calldata");
                    let index = usize::try_from(decoded.index).expect("index");
                    ok(U256::from(self.positions[index].token_id).abi_encode())
                }
                s if s == INonfungiblePositionManager::positionsCall::SELECTOR => {
                    let decoded = INonfungiblePositionManager::positionsCall::abi_decode(
                        &call.calldata,
                        true,
                    )
                    .expect("positions calldata");
                    let Some(p) = self
                        .positions
                        .iter()
                        .find(|p| U256::from(p.token_id) == decoded.tokenId)
                    else {
                        return failed;
                    };
                    ok((
                        U96::ZERO,
                        Address::ZERO,
                        p.token0,
                        p.token1,
                        U24::from(3000u32),
                        I24::try_from(p.tick_lower).expect("tick"),
                        I24::try_from(p.tick_upper).expect("tick"),
                        p.liquidity,
                        U256::ZERO,
                        U256::ZERO,
                        0u128,
                        0u128,
                    )
                        .abi_encode())
                }
                s if s == IUniswapV3Pool::slot0Call::SELECTOR => {
                    if self.broken_pools.contains(&call.target) {
                        return failed;
                    }
                    ok((
                        U160::from(1u128) << 96,
                        I24::ZERO,
                        0u16,
                        0u16,
                        0u16,
                        U256::ZERO,
                        true,
                    )
                        .abi_encode())
                }
                s if s == INonfungiblePositionManager::collectCall::SELECTOR => {
                    ok((U256::from(111), U256::from(222)).abi_encode())
                }
                s if s == IErc20Metadata::nameCall::SELECTOR => {
                    ok("Sim Token".to_string().abi_encode())
                }
                s if s == IErc20Metadata::symbolCall::SELECTOR => {
                    ok("SIM".to_string().abi_encode())
                }
                s if s == IErc20Metadata::decimalsCall::SELECTOR => ok(U256::from(18u8).abi_encode()),
                s if s == IErc20MetadataBytes32::nameCall::SELECTOR
                    || s == IErc20MetadataBytes32::symbolCall::SELECTOR =>
                {
                    ok(B256::ZERO.abi_encode())
                }
                _ => failed,
            }
        }
    }

    #[async_trait]
    impl BatchExecutor for ChainSim {
        async fn execute(&self, calls: &[BatchCall]) -> Result<Vec<CallOutcome>, BatchError> {
            // Let concurrent refreshes overlap.
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(calls.iter().map(|call| self.answer(call)).collect())
        }
    }

    /// Chain whose every batch fails at the transport level.
    struct DeadChain;

    #[async_trait]
    impl BatchExecutor for DeadChain {
        async fn execute(&self, _calls: &[BatchCall]) -> Result<Vec<CallOutcome>, BatchError> {
            Err(BatchError::Transport("connection refused".into()))
        }
    }

    struct ManualFocus {
        focused: AtomicBool,
        listeners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ManualFocus {
        fn new(focused: bool) -> Self {
            Self {
                focused: AtomicBool::new(focused),
                listeners: Mutex::new(Vec::new()),
            }
        }

        fn foreground(&self) {
            self.focused.store(true, Ordering::SeqCst);
            let listeners = std::mem::take(&mut *self.listeners.lock());
            for listener in listeners {
                listener();
            }
        }
    }

    impl FocusSignal for ManualFocus {
        fn has_focus(&self) -> bool {
            self.focused.load(Ordering::SeqCst)
        }

        fn on_foregrounded(&self, callback: Box<dyn FnOnce() + Send>) {
            self.listeners.lock().push(callback);
        }
    }

    fn chain(chain_id: u64, name: &str, sim: Arc<dyn BatchExecutor>) -> Arc<ChainContext> {
        Arc::new(ChainContext::with_executor(
            chain_id,
            name,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            sim,
        ))
    }

    fn orchestrator(
        chains: Vec<Arc<ChainContext>>,
        focus: Arc<dyn FocusSignal>,
        ttl: Duration,
    ) -> Arc<MultiChainPositionOrchestrator> {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn KvStore>;
        Arc::new(MultiChainPositionOrchestrator::new(
            chains,
            Arc::new(TokenMetadataCache::new(store.clone())),
            Arc::new(PoolAddressCache::new(store)),
            PositionCache::new(ttl),
            focus,
        ))
    }

    #[tokio::test]
    async fn aggregates_across_chains_and_isolates_pool_failures() {
        // Chain X holds ids 7 and 9 in different pools; pool state for
        // id 9's pool is unreadable. Chain Y holds id 3 and is healthy.
        let p9 = SimPosition::new(9, 1);
        let broken = lpscope_chain::compute_pool_address(
            Address::repeat_byte(0x02),
            p9.token0,
            p9.token1,
            3000,
            lpscope_chain::POOL_INIT_CODE_HASH,
        );
        let sim_x =
            Arc::new(ChainSim::new(vec![SimPosition::new(7, 0), p9]).with_broken_pool(broken));
        let chain_x = chain(1, "chain-x", sim_x);
        let chain_y = chain(
            137,
            "chain-y",
            Arc::new(ChainSim::new(vec![SimPosition::new(3, 2)])),
        );

        let orch = orchestrator(
            vec![chain_x, chain_y],
            Arc::new(AlwaysFocused),
            DEFAULT_TTL,
        );
        let positions = orch.positions(OWNER).await;

        // Position 9 dropped, position 7 and chain Y's position 3 intact.
        assert_eq!(positions.len(), 2);
        let keys: Vec<_> = positions.iter().map(|p| p.key()).collect();
        assert!(keys.contains(&(1, U256::from(7))));
        assert!(keys.contains(&(137, U256::from(3))));

        let p = positions.iter().find(|p| p.key().0 == 1).unwrap();
        assert!(p.in_range);
        assert!(!p.closed);
        assert_eq!(p.pool.token0.symbol.as_deref(), Some("SIM"));
    }

    #[tokio::test]
    async fn dead_chain_contributes_empty_list() {
        let chain_x = chain(1, "chain-x", Arc::new(ChainSim::new(vec![SimPosition::new(7, 0)])));
        let chain_y = chain(137, "chain-y", Arc::new(DeadChain));

        let orch = orchestrator(
            vec![chain_x, chain_y],
            Arc::new(AlwaysFocused),
            DEFAULT_TTL,
        );
        let positions = orch.positions(OWNER).await;

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].chain_id, 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_aggregation() {
        let sim = Arc::new(ChainSim::new(vec![SimPosition::new(7, 0)]));
        let orch = orchestrator(
            vec![chain(1, "chain-x", sim.clone())],
            Arc::new(AlwaysFocused),
            DEFAULT_TTL,
        );

        let (a, b) = tokio::join!(orch.refresh(OWNER), orch.refresh(OWNER));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sim.balance_reads.load(Ordering::SeqCst), 1);
        assert!(orch.refreshing.is_empty());
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_network() {
        let sim = Arc::new(ChainSim::new(vec![SimPosition::new(7, 0)]));
        let orch = orchestrator(
            vec![chain(1, "chain-x", sim.clone())],
            Arc::new(AlwaysFocused),
            DEFAULT_TTL,
        );

        let first = orch.positions(OWNER).await;
        let second = orch.positions(OWNER).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sim.balance_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_unfocused_serves_stale_and_defers_refresh() {
        let sim = Arc::new(ChainSim::new(vec![SimPosition::new(7, 0)]));
        let focus = Arc::new(ManualFocus::new(true));
        let orch = orchestrator(
            vec![chain(1, "chain-x", sim.clone())],
            focus.clone(),
            Duration::from_secs(60),
        );

        let first = orch.positions(OWNER).await;
        assert_eq!(sim.balance_reads.load(Ordering::SeqCst), 1);
        // Let the TTL timer task register its sleep before advancing.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // Entry goes stale while the host is backgrounded.
        focus.focused.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // Stale data comes back immediately, with no network traffic.
        let stale = orch.positions(OWNER).await;
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(sim.balance_reads.load(Ordering::SeqCst), 1);

        // Foregrounding triggers the deferred refresh; the paused clock
        // auto-advances through the simulated batch latencies.
        focus.foreground();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sim.balance_reads.load(Ordering::SeqCst), 2);
        let refreshed = orch.positions(OWNER).await;
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test]
    async fn fee_enrichment_lands_in_the_ledger() {
        let sim = Arc::new(ChainSim::new(vec![SimPosition::new(7, 0)]));
        let orch = orchestrator(
            vec![chain(1, "chain-x", sim)],
            Arc::new(AlwaysFocused),
            DEFAULT_TTL,
        );

        orch.refresh(OWNER).await;
        // Fire-and-forget: give the spawned enrichment a moment.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            orch.fee_ledger().get(&(1, U256::from(7))),
            Some((U256::from(111), U256::from(222)))
        );

        // The next refresh folds the ledger into the positions.
        let positions = orch.refresh(OWNER).await;
        assert_eq!(positions[0].fees, Some((U256::from(111), U256::from(222))));
    }
}
