//! Read and write policy for the result cache
//!
//! The policy ties the canonicalizer, the signature service and the store
//! together:
//!
//! - a read serves a stored answer only when the signature it was written under
//!   equals the query's current signature
//! - a write stores an answer only when it is complete and final (no missing
//!   or volatile intervals), unless partial data caching is forced, and only
//!   when it fits the size limit
//!
//! Every failure inside the policy degrades to "the cache was empty": reads
//! return `None`, writes report a [`WriteOutcome`] that callers may ignore.

use crate::canonical::Canonicalizer;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::key::{checksum, CacheKey};
use crate::signature::{Signature, SignatureService};
use crate::stats::CacheMetrics;
use crate::store::ResultStore;
use query_core::{AggregationQuery, Interval};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a response may be cached, from the intervals it declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cacheability {
    /// Part of the response's time range has no data loaded yet
    pub has_missing_intervals: bool,
    /// Part of the response's time range may still be revised
    pub has_volatile_intervals: bool,
}

impl Cacheability {
    pub fn new(has_missing_intervals: bool, has_volatile_intervals: bool) -> Self {
        Self {
            has_missing_intervals,
            has_volatile_intervals,
        }
    }

    pub fn from_intervals(missing: &[Interval], volatile: &[Interval]) -> Self {
        Self::new(!missing.is_empty(), !volatile.is_empty())
    }

    /// Complete and final data only
    pub fn is_cacheable(&self) -> bool {
        !self.has_missing_intervals && !self.has_volatile_intervals
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureLookup {
    Pending,
    Resolved(Option<Signature>),
}

/// Key and signature computed during a lookup, reused by the later write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTicket {
    key: CacheKey,
    signature: SignatureLookup,
}

impl CacheTicket {
    /// Ticket whose signature is resolved at write time
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            signature: SignatureLookup::Pending,
        }
    }

    /// Ticket carrying a signature observed earlier
    pub fn with_signature(key: CacheKey, signature: Option<Signature>) -> Self {
        Self {
            key,
            signature: SignatureLookup::Resolved(signature),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The signature observed during the lookup, if one was computed
    pub fn signature(&self) -> Option<Option<Signature>> {
        match self.signature {
            SignatureLookup::Pending => None,
            SignatureLookup::Resolved(signature) => Some(signature),
        }
    }
}

/// Result of [`CachePolicy::lookup`]
#[derive(Debug, Clone, Default)]
pub struct CacheLookup {
    /// The cached answer, when one validated
    pub value: Option<Value>,
    /// Present whenever a key could be derived
    pub ticket: Option<CacheTicket>,
}

impl CacheLookup {
    fn miss(ticket: CacheTicket) -> Self {
        Self {
            value: None,
            ticket: Some(ticket),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }
}

/// Bounded description of a failed write, safe to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSetFailure {
    pub key_length: usize,
    pub key_checksum: Option<String>,
    pub signature_checksum: Option<String>,
    pub value_length: Option<usize>,
    pub error: String,
}

/// What a write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored {
        signature: Option<Signature>,
        value_length: usize,
    },
    Disabled,
    NotCacheable,
    Oversized {
        value_length: usize,
        max_response_bytes: u64,
    },
    Failed(CacheSetFailure),
}

impl WriteOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, WriteOutcome::Stored { .. })
    }
}

/// Signature-validated result cache
pub struct CachePolicy {
    config: CacheConfig,
    canonicalizer: Canonicalizer,
    store: Arc<dyn ResultStore>,
    signatures: Arc<dyn SignatureService>,
    metrics: Arc<CacheMetrics>,
}

impl CachePolicy {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn ResultStore>,
        signatures: Arc<dyn SignatureService>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            config,
            canonicalizer: Canonicalizer::default(),
            store,
            signatures,
            metrics,
        }
    }

    /// Replace the default canonicalizer
    pub fn with_canonicalizer(mut self, canonicalizer: Canonicalizer) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The key both reads and writes use for `query`
    pub fn cache_key(&self, query: &AggregationQuery) -> Result<CacheKey> {
        self.canonicalizer.canonicalize(query)
    }

    /// The cached answer for `query`, if a valid one exists
    pub async fn read(&self, query: &AggregationQuery) -> Option<Value> {
        self.lookup(query).await.value
    }

    /// Like [`read`](Self::read), also returning the ticket for a later write
    pub async fn lookup(&self, query: &AggregationQuery) -> CacheLookup {
        if !self.config.enabled {
            return CacheLookup::default();
        }
        self.metrics.record_request();

        let key = match self.cache_key(query) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Unable to derive cache key, treating as miss");
                self.metrics.record_miss();
                return CacheLookup::default();
            }
        };

        let entry = match self.store.get(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.metrics.record_miss();
                return CacheLookup::miss(CacheTicket::new(key));
            }
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    key_checksum = %key.checksum(),
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                self.metrics.record_miss();
                return CacheLookup::miss(CacheTicket::new(key));
            }
        };

        let current = self.signatures.signature_for(query);
        let valid = current.is_some() && current == entry.signature;
        let ticket = CacheTicket::with_signature(key, current);

        if !valid {
            debug!(
                query_id = query.query_id().unwrap_or("-"),
                key_checksum = %ticket.key.checksum(),
                "Cache entry present but invalid"
            );
            self.metrics.record_potential_hit();
            self.metrics.record_miss();
            return CacheLookup::miss(ticket);
        }

        match decode(&entry.value) {
            Ok(value) => {
                self.metrics.record_hit();
                debug!(
                    query_id = query.query_id().unwrap_or("-"),
                    value_length = entry.value.len(),
                    "Cache hit"
                );
                CacheLookup {
                    value: Some(value),
                    ticket: Some(ticket),
                }
            }
            Err(e) => {
                warn!(
                    key_checksum = %ticket.key.checksum(),
                    error = %e,
                    "Error processing cached value"
                );
                self.metrics.record_miss();
                CacheLookup::miss(ticket)
            }
        }
    }

    /// Offer a computed response for caching
    pub async fn write(
        &self,
        payload: &Value,
        query: &AggregationQuery,
        verdict: Cacheability,
    ) -> WriteOutcome {
        if !self.config.enabled {
            return WriteOutcome::Disabled;
        }
        if !self.admits(verdict) {
            return self.skip_uncacheable(query, verdict);
        }

        match self.cache_key(query) {
            Ok(key) => {
                self.write_with_ticket(CacheTicket::new(key), payload, query, verdict)
                    .await
            }
            Err(e) => self.set_failed(None, None, None, e),
        }
    }

    /// Offer a computed response, reusing the key and signature of a lookup
    pub async fn write_with_ticket(
        &self,
        ticket: CacheTicket,
        payload: &Value,
        query: &AggregationQuery,
        verdict: Cacheability,
    ) -> WriteOutcome {
        if !self.config.enabled {
            return WriteOutcome::Disabled;
        }
        if !self.admits(verdict) {
            return self.skip_uncacheable(query, verdict);
        }

        let value = match serde_json::to_string(payload) {
            Ok(value) => value,
            Err(e) => return self.set_failed(Some(&ticket.key), None, None, e.into()),
        };

        let value_length = value.len();
        if value_length as u64 > self.config.max_response_bytes {
            self.metrics.record_skipped_oversized();
            debug!(
                key_checksum = %ticket.key.checksum(),
                value_length,
                max_response_bytes = self.config.max_response_bytes,
                "Response not cached, length exceeds max value length"
            );
            return WriteOutcome::Oversized {
                value_length,
                max_response_bytes: self.config.max_response_bytes,
            };
        }

        let signature = match ticket.signature {
            SignatureLookup::Resolved(signature) => signature,
            SignatureLookup::Pending => self.signatures.signature_for(query),
        };

        match self.store.set(&ticket.key, signature, Arc::from(value)).await {
            Ok(()) => {
                self.metrics.record_write();
                debug!(
                    key_checksum = %ticket.key.checksum(),
                    value_length,
                    signature = ?signature,
                    "Response cached"
                );
                WriteOutcome::Stored {
                    signature,
                    value_length,
                }
            }
            Err(e) => self.set_failed(Some(&ticket.key), signature, Some(value_length), e),
        }
    }

    fn admits(&self, verdict: Cacheability) -> bool {
        self.config.cache_partial_data || verdict.is_cacheable()
    }

    fn skip_uncacheable(&self, query: &AggregationQuery, verdict: Cacheability) -> WriteOutcome {
        self.metrics.record_skipped_uncacheable();
        debug!(
            query_id = query.query_id().unwrap_or("-"),
            missing = verdict.has_missing_intervals,
            volatile = verdict.has_volatile_intervals,
            "Response not cached, data is partial or volatile"
        );
        WriteOutcome::NotCacheable
    }

    fn set_failed(
        &self,
        key: Option<&CacheKey>,
        signature: Option<Signature>,
        value_length: Option<usize>,
        error: CacheError,
    ) -> WriteOutcome {
        self.metrics.record_set_failure();

        let failure = CacheSetFailure {
            key_length: key.map_or(0, CacheKey::len),
            key_checksum: key.map(CacheKey::checksum),
            signature_checksum: signature.map(|s| checksum(&s.to_string())),
            value_length,
            error: error.to_string(),
        };
        warn!(
            key_length = failure.key_length,
            key_checksum = failure.key_checksum.as_deref().unwrap_or("N/A"),
            signature_checksum = failure.signature_checksum.as_deref().unwrap_or("N/A"),
            value_length = ?failure.value_length,
            error = %failure.error,
            "Unable to cache value"
        );
        WriteOutcome::Failed(failure)
    }
}

fn decode(value: &str) -> Result<Value> {
    serde_json::from_str(value).map_err(|e| CacheError::Decode(e.to_string()))
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("config", &self.config)
            .field("store", &self.store.name())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memory::MemoryResultStore;
    use crate::store::{CacheEntry, TimeoutResultStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use query_core::{Aggregation, Filter, Granularity, QueryType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Signature service whose answer tests can change
    struct MutableSignatures(Mutex<Option<Signature>>);

    impl MutableSignatures {
        fn new(signature: Option<u64>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(signature.map(Signature::new))))
        }

        fn set(&self, signature: Option<u64>) {
            *self.0.lock() = signature.map(Signature::new);
        }
    }

    impl SignatureService for MutableSignatures {
        fn signature_for(&self, _query: &AggregationQuery) -> Option<Signature> {
            *self.0.lock()
        }
    }

    /// Memory store that counts calls to `set`
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryResultStore,
        sets: AtomicUsize,
    }

    impl CountingStore {
        fn sets(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResultStore for CountingStore {
        async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
            self.inner.get(key).await
        }

        async fn set(
            &self,
            key: &CacheKey,
            signature: Option<Signature>,
            value: Arc<str>,
        ) -> Result<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, signature, value).await
        }
    }

    /// Store that is always down
    struct FailingStore;

    #[async_trait]
    impl ResultStore for FailingStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            Err(CacheError::StoreUnavailable("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &CacheKey,
            _signature: Option<Signature>,
            _value: Arc<str>,
        ) -> Result<()> {
            Err(CacheError::StoreUnavailable("connection refused".to_string()))
        }
    }

    /// Store that never answers
    struct HangingStore;

    #[async_trait]
    impl ResultStore for HangingStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            std::future::pending().await
        }

        async fn set(
            &self,
            _key: &CacheKey,
            _signature: Option<Signature>,
            _value: Arc<str>,
        ) -> Result<()> {
            std::future::pending().await
        }
    }

    fn query_with_trace(trace_id: &str) -> AggregationQuery {
        AggregationQuery::builder(QueryType::GroupBy, "wiki")
            .dimension("country")
            .aggregation(Aggregation::count("count"))
            .filter(Filter::selector("country", "US"))
            .granularity(Granularity::Day)
            .interval(Interval::parse("2020-01-01/2020-01-02").unwrap())
            .context("traceId", trace_id)
            .build()
            .unwrap()
    }

    fn query() -> AggregationQuery {
        query_with_trace("abc")
    }

    fn payload() -> Value {
        json!([{"timestamp": "2020-01-01T00:00:00.000Z", "event": {"country": "US", "count": 42}}])
    }

    struct Fixture {
        policy: CachePolicy,
        store: Arc<CountingStore>,
        signatures: Arc<MutableSignatures>,
        metrics: Arc<CacheMetrics>,
    }

    fn fixture(config: CacheConfig) -> Fixture {
        let store = Arc::new(CountingStore::default());
        let signatures = MutableSignatures::new(Some(1));
        let metrics = Arc::new(CacheMetrics::new());
        let policy = CachePolicy::new(
            config,
            store.clone(),
            signatures.clone(),
            Arc::clone(&metrics),
        );
        Fixture {
            policy,
            store,
            signatures,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let f = fixture(CacheConfig::default());
        let q = query();

        assert!(f.policy.read(&q).await.is_none());
        let outcome = f.policy.write(&payload(), &q, Cacheability::default()).await;
        assert_eq!(
            outcome,
            WriteOutcome::Stored {
                signature: Some(Signature::new(1)),
                value_length: serde_json::to_string(&payload()).unwrap().len(),
            }
        );

        assert_eq!(f.policy.read(&q).await, Some(payload()));
        assert_eq!(f.metrics.requests(), 2);
        assert_eq!(f.metrics.hits(), 1);
        assert_eq!(f.metrics.misses(), 1);
        assert_eq!(f.metrics.potential_hits(), 0);
        assert_eq!(f.metrics.writes(), 1);
    }

    #[tokio::test]
    async fn test_stale_signature_is_rejected() {
        let f = fixture(CacheConfig::default());
        let q = query();
        f.policy.write(&payload(), &q, Cacheability::default()).await;

        f.signatures.set(Some(2));
        assert!(f.policy.read(&q).await.is_none());
        assert_eq!(f.metrics.requests(), 1);
        assert_eq!(f.metrics.potential_hits(), 1);
        assert_eq!(f.metrics.misses(), 1);
        assert_eq!(f.metrics.hits(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_signature_is_a_potential_hit() {
        let f = fixture(CacheConfig::default());
        let q = query();
        f.policy.write(&payload(), &q, Cacheability::default()).await;

        f.signatures.set(None);
        assert!(f.policy.read(&q).await.is_none());
        assert_eq!(f.metrics.potential_hits(), 1);
        assert_eq!(f.metrics.misses(), 1);
    }

    #[tokio::test]
    async fn test_unknown_signature_entry_never_validates() {
        let f = fixture(CacheConfig::default());
        let q = query();

        f.signatures.set(None);
        let outcome = f.policy.write(&payload(), &q, Cacheability::default()).await;
        assert!(outcome.is_stored());
        assert_eq!(f.store.sets(), 1);

        f.signatures.set(Some(1));
        assert!(f.policy.read(&q).await.is_none());
        f.signatures.set(None);
        assert!(f.policy.read(&q).await.is_none());
        assert_eq!(f.metrics.potential_hits(), 2);
    }

    #[tokio::test]
    async fn test_cold_miss_is_not_a_potential_hit() {
        let f = fixture(CacheConfig::default());
        assert!(f.policy.read(&query()).await.is_none());
        assert_eq!(f.metrics.requests(), 1);
        assert_eq!(f.metrics.misses(), 1);
        assert_eq!(f.metrics.potential_hits(), 0);
    }

    #[tokio::test]
    async fn test_partial_and_volatile_responses_are_not_written() {
        let f = fixture(CacheConfig::default());
        let q = query();

        for verdict in [
            Cacheability::new(true, false),
            Cacheability::new(false, true),
            Cacheability::new(true, true),
        ] {
            let outcome = f.policy.write(&payload(), &q, verdict).await;
            assert_eq!(outcome, WriteOutcome::NotCacheable);
        }

        assert_eq!(f.store.sets(), 0);
        assert_eq!(f.metrics.skipped_uncacheable(), 3);
        assert!(f.policy.read(&q).await.is_none());
    }

    #[tokio::test]
    async fn test_partial_data_override() {
        let f = fixture(CacheConfig::default().with_cache_partial_data(true));
        let q = query();

        let outcome = f
            .policy
            .write(&payload(), &q, Cacheability::new(true, true))
            .await;
        assert!(outcome.is_stored());
        assert_eq!(f.policy.read(&q).await, Some(payload()));
    }

    #[tokio::test]
    async fn test_oversized_response_is_not_written() {
        let f = fixture(
            CacheConfig::default()
                .with_max_response_bytes(16)
                .with_cache_partial_data(true),
        );
        let q = query();

        for verdict in [Cacheability::default(), Cacheability::new(true, false)] {
            let outcome = f.policy.write(&payload(), &q, verdict).await;
            assert!(matches!(
                outcome,
                WriteOutcome::Oversized {
                    max_response_bytes: 16,
                    ..
                }
            ));
        }
        assert_eq!(f.store.sets(), 0);
        assert_eq!(f.metrics.skipped_oversized(), 2);
    }

    #[tokio::test]
    async fn test_exact_size_limit_is_written() {
        let limit = serde_json::to_string(&payload()).unwrap().len() as u64;
        let f = fixture(CacheConfig::default().with_max_response_bytes(limit));
        let outcome = f
            .policy
            .write(&payload(), &query(), Cacheability::default())
            .await;
        assert!(outcome.is_stored());
    }

    #[tokio::test]
    async fn test_failing_store_degrades_to_miss() {
        let metrics = Arc::new(CacheMetrics::new());
        let policy = CachePolicy::new(
            CacheConfig::default(),
            Arc::new(FailingStore),
            MutableSignatures::new(Some(1)),
            Arc::clone(&metrics),
        );
        let q = query();

        assert!(policy.read(&q).await.is_none());
        assert_eq!(metrics.misses(), 1);

        let outcome = policy.write(&payload(), &q, Cacheability::default()).await;
        match outcome {
            WriteOutcome::Failed(failure) => {
                let key = policy.cache_key(&q).unwrap();
                assert_eq!(failure.key_length, key.len());
                assert_eq!(failure.key_checksum, Some(key.checksum()));
                assert_eq!(
                    failure.signature_checksum,
                    Some(checksum(&Signature::new(1).to_string()))
                );
                assert!(failure.value_length.is_some());
                assert!(failure.error.contains("connection refused"));
            }
            other => panic!("expected a failed write, got {:?}", other),
        }
        assert_eq!(metrics.set_failures(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_store_degrades_to_miss() {
        let metrics = Arc::new(CacheMetrics::new());
        let store = TimeoutResultStore::new(HangingStore, Duration::from_millis(20));
        let policy = CachePolicy::new(
            CacheConfig::default(),
            Arc::new(store),
            MutableSignatures::new(Some(1)),
            Arc::clone(&metrics),
        );
        let q = query();

        assert!(policy.read(&q).await.is_none());
        let outcome = policy.write(&payload(), &q, Cacheability::default()).await;
        assert!(matches!(outcome, WriteOutcome::Failed(_)));
        assert_eq!(metrics.misses(), 1);
        assert_eq!(metrics.set_failures(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let f = fixture(CacheConfig::default());
        let q = query();
        let key = f.policy.cache_key(&q).unwrap();
        f.store
            .set(&key, Some(Signature::new(1)), Arc::from("{not json"))
            .await
            .unwrap();

        assert!(f.policy.read(&q).await.is_none());
        assert_eq!(f.metrics.misses(), 1);
        assert_eq!(f.metrics.hits(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_does_nothing() {
        let f = fixture(CacheConfig::disabled());
        let q = query();

        let outcome = f.policy.write(&payload(), &q, Cacheability::default()).await;
        assert_eq!(outcome, WriteOutcome::Disabled);
        assert!(f.policy.read(&q).await.is_none());
        assert_eq!(f.store.sets(), 0);
        assert_eq!(f.metrics.requests(), 0);
    }

    #[tokio::test]
    async fn test_context_does_not_fragment_cache() {
        let f = fixture(CacheConfig::default());
        let first = query_with_trace("abc");
        let second = query_with_trace("xyz");

        assert_eq!(
            f.policy.cache_key(&first).unwrap(),
            f.policy.cache_key(&second).unwrap()
        );
        f.policy
            .write(&payload(), &first, Cacheability::default())
            .await;
        assert_eq!(f.policy.read(&second).await, Some(payload()));
    }

    #[tokio::test]
    async fn test_response_with_missing_intervals_never_stored() {
        let f = fixture(CacheConfig::default());
        let q = query();
        let missing = vec![Interval::parse("2020-01-01/2020-01-02").unwrap()];
        let verdict = Cacheability::from_intervals(&missing, &[]);

        f.policy.write(&payload(), &q, verdict).await;

        let key = f.policy.cache_key(&q).unwrap();
        assert!(f.store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ticket_reuses_lookup_signature() {
        let f = fixture(CacheConfig::default());
        let q = query();
        f.policy.write(&payload(), &q, Cacheability::default()).await;

        // New data landed: the entry is stale and the lookup sees signature 2
        f.signatures.set(Some(2));
        let lookup = f.policy.lookup(&q).await;
        assert!(!lookup.is_hit());
        let ticket = lookup.ticket.unwrap();
        assert_eq!(ticket.signature(), Some(Some(Signature::new(2))));

        // More data lands while the query runs; the answer reflects signature 2
        f.signatures.set(Some(3));
        let outcome = f
            .policy
            .write_with_ticket(ticket, &payload(), &q, Cacheability::default())
            .await;
        assert_eq!(
            outcome,
            WriteOutcome::Stored {
                signature: Some(Signature::new(2)),
                value_length: serde_json::to_string(&payload()).unwrap().len(),
            }
        );
        assert!(f.policy.read(&q).await.is_none());
    }

    #[tokio::test]
    async fn test_cold_lookup_ticket_is_pending() {
        let f = fixture(CacheConfig::default());
        let lookup = f.policy.lookup(&query()).await;
        let ticket = lookup.ticket.unwrap();
        assert_eq!(ticket.signature(), None);
        assert_eq!(ticket.key(), &f.policy.cache_key(&query()).unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_identical_writes() {
        let f = fixture(CacheConfig::default());
        let q = query();
        let p = payload();

        let writes = (0..8).map(|_| f.policy.write(&p, &q, Cacheability::default()));
        let outcomes = futures::future::join_all(writes).await;

        assert!(outcomes.iter().all(WriteOutcome::is_stored));
        assert_eq!(f.store.sets(), 8);
        assert_eq!(f.store.inner.len(), 1);
        assert_eq!(f.policy.read(&q).await, Some(payload()));
    }

    #[tokio::test]
    async fn test_store_bounds_apply_underneath_policy() {
        let store = Arc::new(MemoryResultStore::new(
            StoreConfig::default().with_max_entries(1),
        ));
        let policy = CachePolicy::new(
            CacheConfig::default(),
            store.clone(),
            MutableSignatures::new(Some(1)),
            Arc::new(CacheMetrics::new()),
        );
        let first = query();
        let mut second = query();
        second.dimensions.push("page".to_string());

        policy.write(&payload(), &first, Cacheability::default()).await;
        policy.write(&payload(), &second, Cacheability::default()).await;

        assert_eq!(store.len(), 1);
        assert!(policy.read(&first).await.is_none());
        assert!(policy.read(&second).await.is_some());
    }

    #[tokio::test]
    async fn test_value_over_store_memory_bound_is_a_failed_write() {
        let metrics = Arc::new(CacheMetrics::new());
        let store = Arc::new(MemoryResultStore::new(
            StoreConfig::default().with_max_memory(64),
        ));
        let policy = CachePolicy::new(
            CacheConfig::default(),
            store.clone(),
            MutableSignatures::new(Some(1)),
            Arc::clone(&metrics),
        );
        let q = query();

        let outcome = policy.write(&payload(), &q, Cacheability::default()).await;

        match outcome {
            WriteOutcome::Failed(failure) => {
                assert!(failure.error.contains("memory bound"));
            }
            other => panic!("expected a failed write, got {:?}", other),
        }
        assert_eq!(metrics.set_failures(), 1);
        assert_eq!(metrics.writes(), 0);
        assert!(store.is_empty());
        assert!(policy.read(&q).await.is_none());
    }
}
