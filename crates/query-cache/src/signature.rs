//! Query signatures
//!
//! A signature summarizes the state of the backend data a query reads. A cached
//! answer is only served while the signature it was stored under still equals
//! the current one.

use crate::segments::SegmentRegistry;
use query_core::AggregationQuery;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Opaque version token for the data relevant to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(u64);

impl Signature {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Signature {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Source of current signatures
///
/// `None` means the signature cannot be determined; callers must treat that
/// as "cannot validate", never as a concrete value.
pub trait SignatureService: Send + Sync {
    fn signature_for(&self, query: &AggregationQuery) -> Option<Signature>;
}

/// Signature service that never knows a signature
#[derive(Debug, Default, Clone)]
pub struct NoSignatureService;

impl SignatureService for NoSignatureService {
    fn signature_for(&self, _query: &AggregationQuery) -> Option<Signature> {
        None
    }
}

/// Signatures derived from the set of segments a query touches
///
/// The signature is the leading 8 bytes of a SHA-256 over the sorted
/// identifiers of every segment, across all tables of the query's data source,
/// whose interval overlaps one of the query's intervals. Loading, dropping or
/// re-versioning any such segment changes it.
#[derive(Debug, Clone)]
pub struct SegmentSignatureService {
    registry: Arc<SegmentRegistry>,
}

impl SegmentSignatureService {
    pub fn new(registry: Arc<SegmentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SegmentRegistry> {
        &self.registry
    }
}

impl SignatureService for SegmentSignatureService {
    fn signature_for(&self, query: &AggregationQuery) -> Option<Signature> {
        let mut tables = query.data_source.table_names();
        tables.sort_unstable();
        tables.dedup();

        let mut identifiers = Vec::new();
        for table in tables {
            let segments = self.registry.segments_intersecting(table, &query.intervals)?;
            identifiers.extend(segments.iter().map(|s| s.identifier()));
        }
        identifiers.sort_unstable();

        let mut hasher = Sha256::new();
        for id in &identifiers {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Some(Signature(u64::from_be_bytes(prefix)))
    }
}
