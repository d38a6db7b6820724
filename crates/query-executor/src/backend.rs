//! Backend seam
//!
//! The backend is whatever actually computes aggregation answers. The gateway
//! only needs the payload and the intervals the backend could not fully answer.

use async_trait::async_trait;
use parking_lot::Mutex;
use query_core::{AggregationQuery, Interval, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A freshly computed answer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendResponse {
    pub payload: Value,
    /// Ranges of the query with no data loaded yet
    pub missing_intervals: Vec<Interval>,
    /// Ranges whose data may still change
    pub volatile_intervals: Vec<Interval>,
}

impl BackendResponse {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_missing_intervals(mut self, intervals: Vec<Interval>) -> Self {
        self.missing_intervals = intervals;
        self
    }

    pub fn with_volatile_intervals(mut self, intervals: Vec<Interval>) -> Self {
        self.volatile_intervals = intervals;
        self
    }
}

/// Executes aggregation queries
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, query: &AggregationQuery) -> Result<BackendResponse>;

    fn name(&self) -> &str {
        "backend"
    }
}

/// Backend answering every query with one configurable response
#[derive(Debug, Default)]
pub struct StaticBackend {
    response: Mutex<BackendResponse>,
    calls: AtomicUsize,
}

impl StaticBackend {
    pub fn new(response: BackendResponse) -> Self {
        Self {
            response: Mutex::new(response),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the response returned from now on
    pub fn set_response(&self, response: BackendResponse) {
        *self.response.lock() = response;
    }

    /// Number of queries executed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryBackend for StaticBackend {
    async fn execute(&self, _query: &AggregationQuery) -> Result<BackendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.lock().clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
