//! Process-lifetime position cache with staleness tracking.
//!
//! Entries are replaced wholesale on every successful refresh and never
//! deleted, only superseded. A TTL timer flips an entry to stale in
//! place, but only if that exact entry is still the current value; a
//! newer `set` cancels the pending transition by identity comparison,
//! not by account key.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::position::PositionInfo;

/// Default time-to-live before a cached position list is marked stale.
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// One cached position list with its staleness flag.
#[derive(Clone)]
pub struct CachedPositions {
    positions: Arc<Vec<PositionInfo>>,
    stale: Arc<AtomicBool>,
}

impl CachedPositions {
    /// The cached position list.
    pub fn positions(&self) -> Arc<Vec<PositionInfo>> {
        Arc::clone(&self.positions)
    }

    /// Whether the TTL has elapsed since this entry was stored.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

/// In-memory cache of each account's full position list.
///
/// Deliberately not durable: positions are rebuilt every process
/// lifetime, unlike token metadata and pool addresses.
pub struct PositionCache {
    entries: Arc<DashMap<Address, CachedPositions>>,
    ttl: Duration,
}

impl PositionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, account: Address) -> Option<CachedPositions> {
        self.entries.get(&account).map(|e| e.clone())
    }

    /// Store a freshly aggregated position list and arm its TTL timer.
    pub fn set(&self, account: Address, positions: Vec<PositionInfo>) -> Arc<Vec<PositionInfo>> {
        let entry = CachedPositions {
            positions: Arc::new(positions),
            stale: Arc::new(AtomicBool::new(false)),
        };
        self.entries.insert(account, entry.clone());

        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        let armed = entry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let still_current = entries
                .get(&account)
                .is_some_and(|current| Arc::ptr_eq(&current.positions, &armed.positions));
            if still_current {
                armed.stale.store(true, Ordering::SeqCst);
                trace!(account = %account, "cached positions went stale");
            }
        });

        entry.positions()
    }
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Host-environment focus/visibility boundary.
///
/// Used only to gate stale-cache refreshes: a stale entry detected while
/// the consuming context is not visible defers its refresh until the
/// context is foregrounded again, instead of polling unwatched networks.
pub trait FocusSignal: Send + Sync {
    fn has_focus(&self) -> bool;

    /// Register a one-shot callback invoked the next time the context
    /// regains user attention.
    fn on_foregrounded(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Focus signal for headless hosts, which are always "visible".
pub struct AlwaysFocused;

impl FocusSignal for AlwaysFocused {
    fn has_focus(&self) -> bool {
        true
    }

    fn on_foregrounded(&self, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }
}
