//! Snapshot cache. Bounded, TTL'd, fingerprint-keyed storage for
//! fully built [`ReportSnapshot`]s, with single-flight coalescing so
//! concurrent requests for the same fingerprint share one fetch instead
//! of stampeding the upstream API.

use crate::models::{Fingerprint, ReportSnapshot};
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

struct Entry {
    snapshot: Arc<ReportSnapshot>,
    inserted_at: Instant,
}

/// Coalesces concurrent misses for the same fingerprint: the first
/// caller publishes its result under this key and notifies all waiters;
/// every other caller blocks on the `Notify` instead of issuing its own
/// fetch.
struct InFlight {
    notify: Notify,
}

pub struct SnapshotCache {
    store: Mutex<LruCache<Fingerprint, Entry>>,
    inflight: Arc<DashMap<Fingerprint, Arc<InFlight>>>,
    ttl: Duration,
}

/// Outcome of a cache probe: either a hit, or a guard the caller must
/// use to either publish a freshly fetched snapshot or report failure so
/// coalesced waiters aren't left hanging forever.
pub enum Probe {
    Hit(Arc<ReportSnapshot>),
    Miss(FetchGuard),
}

/// Held by whichever caller won the race to fetch a given fingerprint.
/// Dropping it without calling `publish` or `fail` still removes the
/// in-flight entry and wakes every waiter (via `Drop`), so the next
/// prober issues a fresh fetch instead of awaiting a notification that
/// already fired — a dropped guard never poisons the cache.
pub struct FetchGuard {
    fingerprint: Fingerprint,
    inflight: Arc<InFlight>,
    inflight_map: Arc<DashMap<Fingerprint, Arc<InFlight>>>,
    resolved: bool,
}

impl SnapshotCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            store: Mutex::new(LruCache::new(capacity)),
            inflight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Checks for a live cached entry without claiming the fingerprint on
    /// a miss. Used for a fast-path check that must not itself become (and
    /// then abandon) the single fetcher — callers that need claim-on-miss
    /// semantics should use [`SnapshotCache::get_or_claim`] instead.
    pub async fn peek(&self, fingerprint: &Fingerprint) -> Option<Arc<ReportSnapshot>> {
        let mut store = self.store.lock().await;
        if let Some(entry) = store.get(fingerprint) {
            if entry.inserted_at.elapsed() < self.ttl {
                crate::metrics::record_cache_hit();
                crate::metrics::set_cache_entries(store.len());
                return Some(entry.snapshot.clone());
            }
            store.pop(fingerprint);
        }
        None
    }

    /// Probes the cache for `fingerprint`. Returns a hit if a live entry
    /// exists, otherwise registers the caller as either the single
    /// fetcher (a [`FetchGuard`]) or a waiter that blocks until the
    /// in-flight fetch resolves, then re-probes.
    pub async fn get_or_claim(&self, fingerprint: &Fingerprint) -> Probe {
        loop {
            {
                let mut store = self.store.lock().await;
                if let Some(entry) = store.get(fingerprint) {
                    if entry.inserted_at.elapsed() < self.ttl {
                        crate::metrics::record_cache_hit();
                        crate::metrics::set_cache_entries(store.len());
                        return Probe::Hit(entry.snapshot.clone());
                    }
                    store.pop(fingerprint);
                }
            }

            if let Some(existing) = self.inflight.get(fingerprint) {
                let waiter = existing.clone();
                drop(existing);
                crate::metrics::record_cache_coalesced();
                debug!(%fingerprint, "awaiting in-flight snapshot fetch");
                waiter.notify.notified().await;
                continue;
            }

            let claim = Arc::new(InFlight {
                notify: Notify::new(),
            });
            match self.inflight.entry(fingerprint.clone()) {
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    v.insert(claim.clone());
                    crate::metrics::record_cache_miss();
                    return Probe::Miss(FetchGuard {
                        fingerprint: fingerprint.clone(),
                        inflight: claim,
                        inflight_map: self.inflight.clone(),
                        resolved: false,
                    });
                }
                dashmap::mapref::entry::Entry::Occupied(o) => {
                    let waiter = o.get().clone();
                    drop(o);
                    crate::metrics::record_cache_coalesced();
                    waiter.notify.notified().await;
                }
            }
        }
    }

    /// Unconditionally removes any cached entry for `fingerprint`. Used
    /// when a request explicitly asks to bypass staleness and force a
    /// refetch.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        let mut store = self.store.lock().await;
        store.pop(fingerprint);
    }
}

impl FetchGuard {
    /// Publishes a freshly fetched snapshot, makes it visible to future
    /// probes, and wakes every caller waiting on this fingerprint.
    pub async fn publish(mut self, cache: &SnapshotCache, snapshot: Arc<ReportSnapshot>) {
        {
            let mut store = cache.store.lock().await;
            store.put(
                self.fingerprint.clone(),
                Entry {
                    snapshot,
                    inserted_at: Instant::now(),
                },
            );
            crate::metrics::set_cache_entries(store.len());
        }
        self.resolve();
    }

    /// Reports that the fetch failed. No entry is published; waiters
    /// wake up, re-probe, and become the next fetcher.
    pub fn fail(mut self, _cache: &SnapshotCache) {
        self.resolve();
    }

    fn resolve(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.inflight_map.remove(&self.fingerprint);
        self.inflight.notify.notify_waiters();
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.resolved {
            self.inflight_map.remove(&self.fingerprint);
            self.inflight.notify.notify_waiters();
        }
    }
}
