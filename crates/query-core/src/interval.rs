//! Time intervals
//!
//! Half-open `[start, end)` UTC intervals in ISO-8601 `start/end` notation,
//! plus the list arithmetic needed to work out which parts of a query's time
//! range are covered by loaded data.

use crate::error::{QueryError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A half-open UTC time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, rejecting ones that end before they start
    ///
    /// Instants are truncated to milliseconds, the precision intervals are
    /// written with.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let start = start.trunc_subsecs(3);
        let end = end.trunc_subsecs(3);
        if end < start {
            return Err(QueryError::invalid_interval(
                format!("{}/{}", format_instant(&start), format_instant(&end)),
                "end precedes start",
            ));
        }
        Ok(Self { start, end })
    }

    /// Parse `start/end`, where each side is a date or an RFC 3339 datetime
    pub fn parse(input: &str) -> Result<Self> {
        let (start, end) = input
            .split_once('/')
            .ok_or_else(|| QueryError::invalid_interval(input, "expected 'start/end'"))?;
        let start = parse_instant(start.trim())
            .ok_or_else(|| QueryError::invalid_interval(input, "unparseable start"))?;
        let end = parse_instant(end.trim())
            .ok_or_else(|| QueryError::invalid_interval(input, "unparseable end"))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the two intervals share at least one instant
    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the intervals intersect or touch end to start
    pub fn abuts_or_overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The parts of `self` not covered by any of `covered`, sorted and disjoint
    pub fn subtract(&self, covered: &[Interval]) -> Vec<Interval> {
        let covered = simplify(covered.iter().copied());
        let mut remaining = Vec::new();
        let mut cursor = self.start;

        for piece in covered.iter().filter(|c| c.intersects(self)) {
            if piece.start > cursor {
                remaining.push(Interval {
                    start: cursor,
                    end: piece.start,
                });
            }
            if piece.end > cursor {
                cursor = piece.end;
            }
            if cursor >= self.end {
                break;
            }
        }

        if cursor < self.end {
            remaining.push(Interval {
                start: cursor,
                end: self.end,
            });
        }
        remaining
    }
}

/// Merge intervals into a sorted list of disjoint, non-empty intervals
pub fn simplify(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if last.abuts_or_overlaps(&interval) => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

fn parse_instant(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_instant(&self.start), format_instant(&self.end))
    }
}

impl FromStr for Interval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Interval::parse(s)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Interval::parse(&raw).map_err(serde::de::Error::custom)
    }
}
