//! Result store abstraction
//!
//! A store maps a [`CacheKey`] to a signature and a serialized value. Expiry and
//! eviction, if any, belong to the store implementation.

use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::signature::Signature;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A stored answer together with the signature it was computed under
///
/// A `None` signature means the data version was unknown at write time; such
/// an entry never validates and is never served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub signature: Option<Signature>,
    pub value: Arc<str>,
}

impl CacheEntry {
    pub fn new(signature: Option<Signature>, value: impl Into<Arc<str>>) -> Self {
        Self {
            signature,
            value: value.into(),
        }
    }

    /// Approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        self.value.len() + std::mem::size_of::<Self>()
    }
}

/// Key/value store backing the result cache
///
/// Implementations must be safe under concurrent calls: a `get` racing a `set`
/// for the same key observes either the old or the new entry, never a mix.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Look up the entry for `key`
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store `value` under `key`, replacing any previous entry
    async fn set(
        &self,
        key: &CacheKey,
        signature: Option<Signature>,
        value: Arc<str>,
    ) -> Result<()>;

    /// Short name used in log lines
    fn name(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl<S: ResultStore + ?Sized> ResultStore for Arc<S> {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &CacheKey,
        signature: Option<Signature>,
        value: Arc<str>,
    ) -> Result<()> {
        (**self).set(key, signature, value).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Bounds every call on an inner store by a timeout
///
/// Meant for stores that talk to a remote service; a call that does not finish
/// in time fails with [`CacheError::StoreTimeout`]. An abandoned `set` may
/// still complete on the remote side.
#[derive(Debug, Clone)]
pub struct TimeoutResultStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ResultStore> TimeoutResultStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn elapsed(&self) -> CacheError {
        CacheError::StoreTimeout(self.timeout.as_millis() as u64)
    }
}

#[async_trait]
impl<S: ResultStore> ResultStore for TimeoutResultStore<S> {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        tokio::time::timeout(self.timeout, self.inner.get(key))
            .await
            .map_err(|_| self.elapsed())?
    }

    async fn set(
        &self,
        key: &CacheKey,
        signature: Option<Signature>,
        value: Arc<str>,
    ) -> Result<()> {
        tokio::time::timeout(self.timeout, self.inner.set(key, signature, value))
            .await
            .map_err(|_| self.elapsed())?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
