//! Derived pool address cache.
//!
//! Pool addresses are a pure function of (chain, token pair, fee tier),
//! so this is memoization with no invalidation: once set, an entry is
//! never recomputed or expired.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::KvStore;

type PoolKey = (u64, Address, Address, u32);

/// Durable cache mapping (chain, token0, token1, fee) to pool address.
pub struct PoolAddressCache {
    store: Arc<dyn KvStore>,
    known: DashMap<PoolKey, Address>,
}

impl PoolAddressCache {
    /// Create a cache pre-seeded from the durable store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let known = DashMap::new();

        for key in store.keys() {
            let Some(pool_key) = parse_store_key(&key) else {
                continue;
            };
            let Some(raw) = store.get(&key) else { continue };
            match raw.parse::<Address>() {
                Ok(address) => {
                    known.insert(pool_key, address);
                }
                Err(err) => warn!(key, error = %err, "discarding unreadable pool entry"),
            }
        }

        debug!(pools = known.len(), "pool address cache seeded from storage");
        Self { store, known }
    }

    pub fn get(&self, chain_id: u64, token0: Address, token1: Address, fee: u32) -> Option<Address> {
        self.known.get(&(chain_id, token0, token1, fee)).map(|a| *a)
    }

    pub fn insert(
        &self,
        chain_id: u64,
        token0: Address,
        token1: Address,
        fee: u32,
        pool: Address,
    ) {
        self.known.insert((chain_id, token0, token1, fee), pool);
        self.store
            .put(&store_key(chain_id, token0, token1, fee), format!("{pool:#x}"));
    }
}

fn store_key(chain_id: u64, token0: Address, token1: Address, fee: u32) -> String {
    format!("pool/{chain_id}/{token0:#x}/{token1:#x}/{fee}")
}

fn parse_store_key(key: &str) -> Option<(u64, Address, Address, u32)> {
    let mut parts = key.strip_prefix("pool/")?.split('/');
    let chain_id = parts.next()?.parse().ok()?;
    let token0 = parts.next()?.parse().ok()?;
    let token1 = parts.next()?.parse().ok()?;
    let fee = parts.next()?.parse().ok()?;
    Some((chain_id, token0, token1, fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn set_then_get() {
        let cache = PoolAddressCache::new(Arc::new(MemoryStore::new()) as Arc<dyn KvStore>);
        let (t0, t1) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let pool = Address::repeat_byte(9);

        assert!(cache.get(1, t0, t1, 3000).is_none());
        cache.insert(1, t0, t1, 3000, pool);
        assert_eq!(cache.get(1, t0, t1, 3000), Some(pool));

        // Different fee tier is a different pool.
        assert!(cache.get(1, t0, t1, 500).is_none());
    }

    #[test]
    fn survives_store_reload() {
        let store = Arc::new(MemoryStore::new());
        let (t0, t1) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let pool = Address::repeat_byte(9);

        {
            let cache = PoolAddressCache::new(store.clone() as Arc<dyn KvStore>);
            cache.insert(42161, t0, t1, 500, pool);
        }

        let reloaded = PoolAddressCache::new(store as Arc<dyn KvStore>);
        assert_eq!(reloaded.get(42161, t0, t1, 500), Some(pool));
    }
}
