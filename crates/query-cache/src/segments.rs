//! Segment metadata tracking
//!
//! The backend stores each table as time-partitioned segments. When a segment
//! lands or is dropped, the answer to any query touching its interval may
//! change. The registry records which segments exist so that signatures and
//! data coverage can be derived from its current state.

use dashmap::DashMap;
use query_core::{simplify, Interval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One physical data partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    pub data_source: String,
    pub interval: Interval,
    pub version: String,
    #[serde(default)]
    pub partition: u32,
    #[serde(default)]
    pub size_bytes: u64,
}

impl SegmentMetadata {
    pub fn new(
        data_source: impl Into<String>,
        interval: Interval,
        version: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            interval,
            version: version.into(),
            partition: 0,
            size_bytes: 0,
        }
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = partition;
        self
    }

    /// Unique identifier of the segment within the backend
    ///
    /// Data source and version are free text, so both carry a length prefix.
    pub fn identifier(&self) -> String {
        format!(
            "{}:{}_{}_{}_{}:{}_{}",
            self.data_source.len(),
            self.data_source,
            self.interval.start().to_rfc3339(),
            self.interval.end().to_rfc3339(),
            self.version.len(),
            self.version,
            self.partition
        )
    }
}

/// Changes to the set of loaded segments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SegmentEvent {
    /// Start tracking a data source before any segment is loaded
    Tracked { data_source: String },
    /// A segment became queryable
    Loaded { segment: SegmentMetadata },
    /// A segment was removed
    Dropped { segment: SegmentMetadata },
    /// A whole data source is no longer served
    DataSourceDropped { data_source: String },
}

impl SegmentEvent {
    pub fn loaded(segment: SegmentMetadata) -> Self {
        Self::Loaded { segment }
    }

    pub fn dropped(segment: SegmentMetadata) -> Self {
        Self::Dropped { segment }
    }
}

/// Concurrent registry of loaded segments per data source
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    /// data source -> (segment identifier -> segment)
    segments: DashMap<String, BTreeMap<String, SegmentMetadata>>,
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a metadata change
    pub fn apply(&self, event: SegmentEvent) {
        match event {
            SegmentEvent::Tracked { data_source } => self.track(&data_source),
            SegmentEvent::Loaded { segment } => self.load(segment),
            SegmentEvent::Dropped { segment } => {
                self.drop_segment(&segment);
            }
            SegmentEvent::DataSourceDropped { data_source } => {
                self.drop_data_source(&data_source);
            }
        }
    }

    pub fn track(&self, data_source: &str) {
        self.segments.entry(data_source.to_string()).or_default();
    }

    pub fn load(&self, segment: SegmentMetadata) {
        let id = segment.identifier();
        debug!(segment = %id, "Segment loaded");
        self.segments
            .entry(segment.data_source.clone())
            .or_default()
            .insert(id, segment);
    }

    /// Remove a segment, returning whether it was present
    pub fn drop_segment(&self, segment: &SegmentMetadata) -> bool {
        let id = segment.identifier();
        let removed = self
            .segments
            .get_mut(&segment.data_source)
            .map(|mut segments| segments.remove(&id).is_some())
            .unwrap_or(false);
        if removed {
            debug!(segment = %id, "Segment dropped");
        }
        removed
    }

    pub fn drop_data_source(&self, data_source: &str) -> bool {
        self.segments.remove(data_source).is_some()
    }

    pub fn is_tracked(&self, data_source: &str) -> bool {
        self.segments.contains_key(data_source)
    }

    pub fn data_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.segments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn segment_count(&self) -> usize {
        self.segments.iter().map(|e| e.value().len()).sum()
    }

    /// Segments of `data_source` overlapping any of `intervals`
    ///
    /// `None` when the data source is not tracked.
    pub fn segments_intersecting(
        &self,
        data_source: &str,
        intervals: &[Interval],
    ) -> Option<Vec<SegmentMetadata>> {
        let segments = self.segments.get(data_source)?;
        Some(
            segments
                .values()
                .filter(|s| intervals.iter().any(|i| i.intersects(&s.interval)))
                .cloned()
                .collect(),
        )
    }

    /// The parts of `intervals` that loaded segments cover, simplified
    pub fn coverage(&self, data_source: &str, intervals: &[Interval]) -> Option<Vec<Interval>> {
        let segments = self.segments_intersecting(data_source, intervals)?;
        Some(simplify(segments.into_iter().map(|s| s.interval)))
    }

    /// The parts of `intervals` no loaded segment covers
    ///
    /// An untracked data source is missing entirely.
    pub fn missing(&self, data_source: &str, intervals: &[Interval]) -> Vec<Interval> {
        let covered = self.coverage(data_source, intervals).unwrap_or_default();
        simplify(intervals.iter().flat_map(|i| i.subtract(&covered)))
    }
}
