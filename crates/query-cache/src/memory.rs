//! In-memory LRU result store

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::signature::Signature;
use crate::store::{CacheEntry, ResultStore};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry as held by the LRU, with bookkeeping for expiry and memory limits
#[derive(Debug, Clone)]
struct StoredEntry {
    entry: CacheEntry,
    created_at: Instant,
    size_bytes: usize,
}

impl StoredEntry {
    fn new(entry: CacheEntry) -> Self {
        let size_bytes = entry.size_bytes();
        Self {
            entry,
            created_at: Instant::now(),
            size_bytes,
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// LRU map plus its memory accounting, guarded together
struct Inner {
    entries: LruCache<CacheKey, StoredEntry, ahash::RandomState>,
    memory_used: usize,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> Option<StoredEntry> {
        let removed = self.entries.pop(key)?;
        self.memory_used = self.memory_used.saturating_sub(removed.size_bytes);
        Some(removed)
    }
}

/// Counters for the store's own eviction policy
#[derive(Debug, Default)]
pub struct MemoryStoreStats {
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejected: AtomicU64,
}

impl MemoryStoreStats {
    /// Entries pushed out by the entry or memory bound
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped because their TTL elapsed
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Values too large to ever fit
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Bounded in-memory store
///
/// Evicts least recently used entries when either the entry count or the
/// approximate memory bound would be exceeded, and drops entries older than the
/// configured TTL on access. Every operation runs under one lock, so readers
/// never see a half-applied write.
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
    stats: Arc<MemoryStoreStats>,
}

impl MemoryResultStore {
    pub fn new(config: StoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::with_hasher(capacity, ahash::RandomState::new()),
                memory_used: 0,
            }),
            config,
            stats: Arc::new(MemoryStoreStats::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StoreConfig::default())
    }

    /// Look up an entry without touching recency
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let inner = self.inner.lock();
        inner
            .entries
            .peek(key)
            .filter(|stored| !stored.is_expired(self.config.ttl()))
            .map(|stored| stored.entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Approximate bytes held by stored values
    pub fn memory_used(&self) -> usize {
        self.inner.lock().memory_used
    }

    pub fn stats(&self) -> Arc<MemoryStoreStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Drop every expired entry, returning how many were removed
    pub fn expire_stale(&self) -> usize {
        let ttl = self.config.ttl();
        if ttl.is_none() {
            return 0;
        }

        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, stored)| stored.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if inner.remove(key).is_some() {
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        expired.len()
    }

    fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let ttl = self.config.ttl();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(stored) if !stored.is_expired(ttl) => return Some(stored.entry.clone()),
            Some(_) => true,
            None => false,
        };

        if expired && inner.remove(key).is_some() {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Store an entry, returning whether it was kept.
    ///
    /// An entry larger than the whole memory bound is rejected and any older
    /// entry under the same key is dropped with it.
    fn put_entry(&self, key: CacheKey, entry: CacheEntry) -> bool {
        let stored = StoredEntry::new(entry);
        let entry_size = stored.size_bytes;

        let mut inner = self.inner.lock();
        inner.remove(&key);

        if entry_size > self.config.max_memory_bytes {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        while inner.memory_used + entry_size > self.config.max_memory_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.memory_used = inner.memory_used.saturating_sub(evicted.size_bytes);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        if let Some((_, evicted)) = inner.entries.push(key, stored) {
            inner.memory_used = inner.memory_used.saturating_sub(evicted.size_bytes);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.memory_used += entry_size;
        true
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.get_entry(key))
    }

    async fn set(
        &self,
        key: &CacheKey,
        signature: Option<Signature>,
        value: Arc<str>,
    ) -> Result<()> {
        if self.put_entry(key.clone(), CacheEntry::new(signature, value)) {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable(
                "value exceeds store memory bound".to_string(),
            ))
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for MemoryResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryResultStore")
            .field("max_entries", &self.config.max_entries)
            .field("max_memory_bytes", &self.config.max_memory_bytes)
            .field("ttl", &self.config.ttl())
            .field("current_entries", &self.len())
            .field("memory_used", &self.memory_used())
            .finish()
    }
}
