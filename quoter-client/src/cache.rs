//! # Query cache
//!
//! Holds the last result per [`Fingerprint`] and makes sure at most one resolution per fingerprint
//! is in flight. Callers arriving while a resolution runs wait for it and share its result.
//!
//! Entries are published through a `watch` channel so subscribers see every update, including
//! results produced by resolutions they did not trigger.
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{watch, Mutex as AsyncMutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, trace};

use crate::{args::Fingerprint, quote::QuoteResult};

/// Point in time view of a cache entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub result: Option<QuoteResult>,
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
    /// Incremented on every stored result.
    pub generation: u64,
}

impl CacheSnapshot {
    /// An entry without a result is always stale.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.updated_at
            .map_or(true, |at| at.elapsed() >= stale_time)
    }
}

pub struct CacheEntry {
    state: watch::Sender<CacheSnapshot>,
    in_flight: AsyncMutex<()>,
    subscribers: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl CacheEntry {
    fn new() -> Self {
        let (state, _) = watch::channel(CacheSnapshot::default());
        Self {
            state,
            in_flight: AsyncMutex::new(()),
            subscribers: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    fn store(&self, result: QuoteResult) {
        self.state.send_modify(|s| {
            s.result = Some(result);
            s.updated_at = Some(Instant::now());
            s.is_fetching = false;
            s.generation += 1;
        });
        self.touch();
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    fn is_evictable(self: &Arc<Self>, gc_time: Duration) -> bool {
        self.subscribers() == 0 &&
            // Nobody outside the map holds the entry, e.g. a fetch that just looked it up.
            Arc::strong_count(self) == 1 &&
            self.in_flight.try_lock().is_ok() &&
            self.last_active.lock().elapsed() >= gc_time
    }
}

/// Resets the fetching flag if a resolution is dropped before it stores a result.
struct FetchingFlag<'a>(&'a CacheEntry);

impl<'a> FetchingFlag<'a> {
    fn raise(entry: &'a CacheEntry) -> Self {
        entry
            .state
            .send_if_modified(|s| !std::mem::replace(&mut s.is_fetching, true));
        Self(entry)
    }
}

impl Drop for FetchingFlag<'_> {
    fn drop(&mut self) {
        self.0
            .state
            .send_if_modified(|s| std::mem::replace(&mut s.is_fetching, false));
    }
}

/// Keeps an entry alive while a consumer is attached to it.
///
/// Dropping the handle releases the entry, which becomes evictable once `gc_time` has passed.
pub struct EntryHandle {
    fingerprint: Fingerprint,
    entry: Arc<CacheEntry>,
}

impl EntryHandle {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.entry.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.entry.state.subscribe()
    }
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        self.entry
            .subscribers
            .fetch_sub(1, Ordering::SeqCst);
        self.entry.touch();
        trace!(fingerprint = %self.fingerprint, "Released cache entry");
    }
}

/// Cache of quote results keyed by fingerprint.
pub struct QueryCache {
    name: String,
    stale_time: Duration,
    gc_time: Duration,
    entries: RwLock<HashMap<Fingerprint, Arc<CacheEntry>>>,
}

impl QueryCache {
    pub fn new(name: &str, stale_time: Duration, gc_time: Duration) -> Self {
        Self { name: name.to_string(), stale_time, gc_time, entries: RwLock::new(HashMap::new()) }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn gc_time(&self) -> Duration {
        self.gc_time
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn entry(&self, fingerprint: &Fingerprint) -> Arc<CacheEntry> {
        if let Some(entry) = self.entries.read().get(fingerprint) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                trace!(cache = %self.name, %fingerprint, "Created cache entry");
                Arc::new(CacheEntry::new())
            })
            .clone()
    }

    /// Returns the current state of an entry without creating it or waiting on anything.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheSnapshot> {
        let snapshot = self
            .entries
            .read()
            .get(fingerprint)
            .map(|e| e.snapshot());
        match snapshot
            .as_ref()
            .and_then(|s| s.result.as_ref())
        {
            Some(_) => counter!("quote_cache_hits", "cache" => self.name.clone()).increment(1),
            None => counter!("quote_cache_misses", "cache" => self.name.clone()).increment(1),
        }
        snapshot
    }

    /// Stores a result as if it had just been resolved.
    pub fn set(&self, fingerprint: &Fingerprint, result: QuoteResult) {
        self.entry(fingerprint).store(result);
    }

    /// Watches an entry, creating it if needed.
    pub fn subscribe(&self, fingerprint: &Fingerprint) -> watch::Receiver<CacheSnapshot> {
        self.entry(fingerprint).state.subscribe()
    }

    /// Attaches a consumer to an entry, keeping it from being evicted.
    ///
    /// The subscriber is counted while the map is locked, so a concurrent sweep either evicts the
    /// entry before it is looked up or sees the subscriber.
    pub fn attach(&self, fingerprint: &Fingerprint) -> EntryHandle {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                trace!(cache = %self.name, %fingerprint, "Created cache entry");
                Arc::new(CacheEntry::new())
            })
            .clone();
        entry
            .subscribers
            .fetch_add(1, Ordering::SeqCst);
        entry.touch();
        drop(entries);
        EntryHandle { fingerprint: fingerprint.clone(), entry }
    }

    /// Resolves `fingerprint` with `resolve` unless a resolution for it is already in flight, in
    /// which case this waits for that one and returns its result.
    ///
    /// The result is stored before it is returned.
    pub async fn fetch<F, Fut>(&self, fingerprint: &Fingerprint, resolve: F) -> QuoteResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QuoteResult>,
    {
        let entry = self.entry(fingerprint);
        let seen = entry.state.borrow().generation;

        let guard = match entry.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                trace!(cache = %self.name, %fingerprint, "Joining in-flight resolution");
                entry.in_flight.lock().await
            }
        };

        // A resolution finished between reading the generation and taking the lock.
        let snapshot = entry.snapshot();
        if snapshot.generation != seen {
            if let Some(result) = snapshot.result {
                counter!("quote_cache_hits", "cache" => self.name.clone()).increment(1);
                return result;
            }
        }

        debug!(cache = %self.name, %fingerprint, "Resolving quote");
        let flag = FetchingFlag::raise(&entry);
        let result = resolve().await;
        entry.store(result.clone());
        drop(flag);
        drop(guard);
        result
    }

    /// Drops every entry that has no subscribers, is not resolving or otherwise referenced and was
    /// released more than `gc_time` ago. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(self.gc_time));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(cache = %self.name, evicted, remaining = entries.len(), "Evicted cache entries");
            counter!("quote_cache_evictions", "cache" => self.name.clone()).increment(evicted as u64);
        }
        evicted
    }

    /// Runs [`QueryCache::sweep`] every `period` until the returned task is aborted.
    pub fn spawn_gc(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => return,
                }
            }
        })
    }
}
