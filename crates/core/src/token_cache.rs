//! Token metadata cache with request deduplication.
//!
//! Token identity is immutable, so resolved metadata is written through to
//! durable storage and never expires. Concurrent lookups for the same
//! `(chain, address)` share one underlying batched fetch via an in-flight
//! table of shared futures; the table only holds pending work and is
//! emptied as batches resolve.

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use lpscope_chain::contracts::{IErc20Metadata, IErc20MetadataBytes32};
use lpscope_chain::{BatchCall, CallOutcome, ChainContext};

use crate::storage::KvStore;

/// Decimal count substituted when a token's metadata cannot be resolved.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Calls issued per unresolved token address.
const CALLS_PER_TOKEN: usize = 5;

/// Resolved ERC-20 metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub decimals: u8,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

impl TokenMetadata {
    /// Placeholder for a token whose metadata calls all failed. Keeps the
    /// position displayable instead of dropping it.
    pub fn synthetic(address: Address) -> Self {
        Self {
            address,
            decimals: DEFAULT_DECIMALS,
            symbol: None,
            name: None,
        }
    }

    /// True if nothing beyond the address is known.
    pub fn is_synthetic(&self) -> bool {
        self.symbol.is_none() && self.name.is_none() && self.decimals == DEFAULT_DECIMALS
    }
}

pub type TokenKey = (u64, Address);
type SharedFetch = Shared<BoxFuture<'static, Arc<HashMap<Address, TokenMetadata>>>>;

/// Durable cache of resolved token metadata plus the in-flight table.
pub struct TokenMetadataCache {
    store: Arc<dyn KvStore>,
    known: DashMap<TokenKey, TokenMetadata>,
    in_flight: DashMap<TokenKey, SharedFetch>,
    /// Serializes the check-then-register step of `get_tokens`. Held only
    /// across classification and in-flight registration, never across an
    /// await.
    claim: Mutex<()>,
}

impl TokenMetadataCache {
    /// Create a cache pre-seeded from the durable store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let known = DashMap::new();

        for key in store.keys() {
            let Some((chain_id, address)) = parse_store_key(&key) else {
                continue;
            };
            let Some(raw) = store.get(&key) else { continue };
            match serde_json::from_str::<TokenMetadata>(&raw) {
                Ok(meta) => {
                    known.insert((chain_id, address), meta);
                }
                Err(err) => warn!(key, error = %err, "discarding unreadable token entry"),
            }
        }

        debug!(tokens = known.len(), "token cache seeded from storage");
        Self {
            store,
            known,
            in_flight: DashMap::new(),
            claim: Mutex::new(()),
        }
    }

    /// Seed statically known tokens (well-known token lists). Memory only;
    /// the durable store keeps what was resolved on-chain.
    pub fn seed(&self, chain_id: u64, tokens: &[TokenMetadata]) {
        for token in tokens {
            self.known
                .entry((chain_id, token.address))
                .or_insert_with(|| token.clone());
        }
    }

    /// Already-resolved metadata, if any.
    pub fn get_cached(&self, chain_id: u64, address: Address) -> Option<TokenMetadata> {
        self.known.get(&(chain_id, address)).map(|m| m.clone())
    }

    /// Resolve metadata for every requested address on `chain`.
    ///
    /// The returned map always contains an entry per requested address;
    /// unresolvable tokens get a synthetic placeholder. Addresses already
    /// being fetched by another caller are awaited, not re-requested.
    pub async fn get_tokens(
        &self,
        addresses: &[Address],
        chain: &Arc<ChainContext>,
    ) -> HashMap<Address, TokenMetadata> {
        let mut resolved = HashMap::new();
        let mut awaiting: Vec<(Address, SharedFetch)> = Vec::new();
        let mut missing: Vec<Address> = Vec::new();
        let mut claimed: Option<SharedFetch> = None;

        // Classification and in-flight registration happen under one lock
        // so two parallel callers cannot both claim the same address.
        {
            let _claim = self.claim.lock();

            for &address in addresses {
                if resolved.contains_key(&address)
                    || awaiting.iter().any(|(a, _)| *a == address)
                    || missing.contains(&address)
                {
                    continue;
                }
                let key = (chain.chain_id, address);
                if let Some(meta) = self.known.get(&key) {
                    resolved.insert(address, meta.clone());
                } else if let Some(pending) = self.in_flight.get(&key) {
                    awaiting.push((address, pending.clone()));
                } else {
                    missing.push(address);
                }
            }

            if !missing.is_empty() {
                let fetch = {
                    let chain = Arc::clone(chain);
                    let addresses = missing.clone();
                    async move { Arc::new(fetch_token_metadata(&chain, &addresses).await) }
                        .boxed()
                        .shared()
                };
                for &address in &missing {
                    self.in_flight
                        .insert((chain.chain_id, address), fetch.clone());
                }
                claimed = Some(fetch);
            }
        }

        if let Some(fetch) = claimed {
            let fetched = fetch.await;

            for &address in &missing {
                self.in_flight.remove(&(chain.chain_id, address));
                match fetched.get(&address) {
                    Some(meta) => {
                        self.persist(chain.chain_id, meta);
                        resolved.insert(address, meta.clone());
                    }
                    None => {
                        resolved.insert(address, TokenMetadata::synthetic(address));
                    }
                }
            }
        }

        for (address, pending) in awaiting {
            let fetched = pending.await;
            // The originating caller persists; by now the token is either
            // known or unresolvable.
            let meta = self
                .get_cached(chain.chain_id, address)
                .or_else(|| fetched.get(&address).cloned())
                .unwrap_or_else(|| TokenMetadata::synthetic(address));
            resolved.insert(address, meta);
        }

        resolved
    }

    fn persist(&self, chain_id: u64, meta: &TokenMetadata) {
        self.known.insert((chain_id, meta.address), meta.clone());
        match serde_json::to_string(meta) {
            Ok(raw) => self.store.put(&store_key(chain_id, meta.address), raw),
            Err(err) => warn!(error = %err, "failed to serialize token entry"),
        }
    }
}

fn store_key(chain_id: u64, address: Address) -> String {
    format!("token/{chain_id}/{address:#x}")
}

fn parse_store_key(key: &str) -> Option<(u64, Address)> {
    let rest = key.strip_prefix("token/")?;
    let (chain, address) = rest.split_once('/')?;
    Some((chain.parse().ok()?, address.parse().ok()?))
}

/// Issue one batched metadata call covering every address: string name,
/// string symbol, decimals, plus bytes32 name/symbol fallbacks.
///
/// A batch-level failure resolves to an empty map; callers substitute
/// synthetic tokens so a requested address is never missing.
async fn fetch_token_metadata(
    chain: &ChainContext,
    addresses: &[Address],
) -> HashMap<Address, TokenMetadata> {
    let mut calls = Vec::with_capacity(addresses.len() * CALLS_PER_TOKEN);
    for &address in addresses {
        calls.push(BatchCall::new(address, IErc20Metadata::nameCall {}.abi_encode()));
        calls.push(BatchCall::new(address, IErc20Metadata::symbolCall {}.abi_encode()));
        calls.push(BatchCall::new(address, IErc20Metadata::decimalsCall {}.abi_encode()));
        calls.push(BatchCall::new(address, IErc20MetadataBytes32::nameCall {}.abi_encode()));
        calls.push(BatchCall::new(address, IErc20MetadataBytes32::symbolCall {}.abi_encode()));
    }

    let outcomes = match chain.fetcher.fetch(calls).await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            warn!(chain = %chain.name, error = %err, "token metadata batch failed");
            return HashMap::new();
        }
    };

    addresses
        .iter()
        .enumerate()
        .filter_map(|(i, &address)| {
            let chunk = &outcomes[i * CALLS_PER_TOKEN..(i + 1) * CALLS_PER_TOKEN];
            decode_token(address, chunk).map(|meta| (address, meta))
        })
        .collect()
}

/// Decode one token's five-call result chunk. Returns None when every
/// call failed, meaning the address is likely not a token at all.
fn decode_token(address: Address, chunk: &[CallOutcome]) -> Option<TokenMetadata> {
    if chunk.iter().all(|o| o.data().is_none()) {
        return None;
    }

    let name = decode_name(&chunk[0]).or_else(|| decode_bytes32(&chunk[3]));
    let symbol = decode_symbol(&chunk[1]).or_else(|| decode_bytes32(&chunk[4]));
    let decimals = chunk[2]
        .data()
        .and_then(|d| IErc20Metadata::decimalsCall::abi_decode_returns(d, true).ok())
        .map(|r| r._0)
        .unwrap_or(DEFAULT_DECIMALS);

    Some(TokenMetadata {
        address,
        decimals,
        symbol,
        name,
    })
}

fn decode_name(outcome: &CallOutcome) -> Option<String> {
    outcome
        .data()
        .and_then(|d| IErc20Metadata::nameCall::abi_decode_returns(d, true).ok())
        .map(|r| r._0)
        .filter(|s| !s.is_empty())
}

fn decode_symbol(outcome: &CallOutcome) -> Option<String> {
    outcome
        .data()
        .and_then(|d| IErc20Metadata::symbolCall::abi_decode_returns(d, true).ok())
        .map(|r| r._0)
        .filter(|s| !s.is_empty())
}

/// Fixed-size byte strings: strip trailing NULs, keep valid UTF-8.
fn decode_bytes32(outcome: &CallOutcome) -> Option<String> {
    let data = outcome.data()?;
    let raw = IErc20MetadataBytes32::nameCall::abi_decode_returns(data, true)
        .ok()?
        ._0;
    let trimmed: Vec<u8> = raw.iter().copied().take_while(|&b| b != 0).collect();
    let s = String::from_utf8(trimmed).ok()?;
    (!s.is_empty()).then_some(s)
}
