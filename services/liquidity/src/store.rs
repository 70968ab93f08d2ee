//! Shared TTL key/value maps
//!
//! Every race in this subsystem resolves through these maps: they stand
//! in for the shared, eventually-consistent store that the production
//! deployment reads and writes over the network. Entry-level atomicity
//! (`create_if_absent`) is the primitive the auction uses to decide
//! which caller arms the collection window.
//!
//! Expiry is lazy: an entry past its deadline is treated as absent at
//! read time and physically removed on the next touch or purge.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use types::ids::{AccountId, ChainId, MarketId, OrderId};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Key for per-(chain, market) liquidity state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    pub chain: ChainId,
    pub market: MarketId,
}

impl BookKey {
    pub fn new(chain: ChainId, market: MarketId) -> Self {
        Self { chain, market }
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.market)
    }
}

/// Key for per-(chain, order) auction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub chain: ChainId,
    pub order_id: OrderId,
}

impl OrderKey {
    pub fn new(chain: ChainId, order_id: OrderId) -> Self {
        Self { chain, order_id }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.order_id)
    }
}

/// Busy marker for a maker that won an auction and has not yet settled.
///
/// While present, the maker must not win another auction and must not
/// push new liquidity for any market. Released only by TTL expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerBusyLock {
    pub order_id: OrderId,
    pub routing_token: String,
}

/// Fence set the instant a winner is chosen, rejecting late or duplicate
/// matchorder calls for the same order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderConsumedFence {
    pub winner: AccountId,
    pub matched_at: i64,
}

#[derive(Debug, Clone)]
struct TtlEntry<V> {
    value: V,
    expires_at: i64,
}

/// A concurrent map whose entries expire at a deadline.
#[derive(Debug)]
pub struct TtlMap<K: Eq + Hash, V> {
    entries: DashMap<K, TtlEntry<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace, expiring `ttl_nanos` after `now`.
    pub fn insert(&self, key: K, value: V, ttl_nanos: i64, now: i64) {
        self.entries.insert(
            key,
            TtlEntry {
                value,
                expires_at: now.saturating_add(ttl_nanos),
            },
        );
    }

    /// Read a live entry. An expired entry is removed and reads as absent.
    pub fn get(&self, key: &K, now: i64) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(entry) => {
                drop(entry);
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                None
            }
            None => None,
        }
    }

    /// Whether a live entry exists.
    pub fn contains(&self, key: &K, now: i64) -> bool {
        self.get(key, now).is_some()
    }

    /// Nanoseconds until the entry expires, if live.
    pub fn remaining_ttl(&self, key: &K, now: i64) -> Option<i64> {
        self.entries
            .get(key)
            .map(|entry| entry.expires_at - now)
            .filter(|remaining| *remaining > 0)
    }

    /// Atomically create the entry if no live entry exists.
    ///
    /// Returns true when *this* call created (or revived an expired)
    /// entry — the caller that gets `true` is the unique creator, even
    /// under concurrent callers.
    pub fn create_if_absent(&self, key: K, value: V, ttl_nanos: i64, now: i64) -> bool {
        let expires_at = now.saturating_add(ttl_nanos);
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(TtlEntry { value, expires_at });
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TtlEntry { value, expires_at });
                true
            }
        }
    }

    /// Remove and return the entry if live.
    pub fn remove(&self, key: &K, now: i64) -> Option<V> {
        self.entries
            .remove(key)
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Number of entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
