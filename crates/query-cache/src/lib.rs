//! Signature-validated result cache for aggregation queries
//!
//! Answers to repeated aggregation queries are stored under a canonical key
//! derived from the query, together with a signature identifying the exact set
//! of data segments the answer was computed from. A stored answer is served only
//! while the current signature still matches, so new or replaced data makes old
//! answers unreachable without any explicit invalidation.
//!
//! # Features
//!
//! - **Canonical keys**: Semantically identical queries share one entry;
//!   per-request `context` never fragments the cache
//! - **Segment signatures**: Staleness is detected by comparing data versions
//! - **Write gating**: Partial and volatile answers are not stored
//! - **Pluggable stores**: Any [`ResultStore`]; an LRU [`MemoryResultStore`]
//!   with TTL and memory limits is included
//! - **Fail-open**: Store and decode errors degrade to cache misses
//! - **Metrics**: Requests, hits, potential hits, misses and set failures
//!
//! # Example
//!
//! ```ignore
//! use query_cache::{CacheConfig, CacheMetrics, CachePolicy, Cacheability};
//! use query_cache::{MemoryResultStore, SegmentRegistry, SegmentSignatureService};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SegmentRegistry::new());
//! let policy = CachePolicy::new(
//!     CacheConfig::default(),
//!     Arc::new(MemoryResultStore::with_defaults()),
//!     Arc::new(SegmentSignatureService::new(registry)),
//!     Arc::new(CacheMetrics::new()),
//! );
//!
//! if let Some(answer) = policy.read(&query).await {
//!     return Ok(answer);
//! }
//! let answer = backend.execute(&query).await?;
//! policy.write(&answer, &query, Cacheability::default()).await;
//! ```

pub mod canonical;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod policy;
pub mod segments;
pub mod signature;
pub mod stats;
pub mod store;

pub use canonical::Canonicalizer;
pub use config::{CacheConfig, StoreConfig};
pub use error::{CacheError, Result};
pub use key::CacheKey;
pub use memory::{MemoryResultStore, MemoryStoreStats};
pub use policy::{
    CacheLookup, CachePolicy, CacheSetFailure, CacheTicket, Cacheability, WriteOutcome,
};
pub use segments::{SegmentEvent, SegmentMetadata, SegmentRegistry};
pub use signature::{NoSignatureService, SegmentSignatureService, Signature, SignatureService};
pub use stats::{CacheMetrics, CacheMetricsSnapshot};
pub use store::{CacheEntry, ResultStore, TimeoutResultStore};
