//! Responses flowing through the pipeline

use crate::backend::BackendResponse;
use query_cache::{CacheTicket, Cacheability};
use query_core::{AggregationQuery, Interval};
use serde_json::Value;
use std::sync::Arc;

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Backend,
    Cache,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Backend => write!(f, "backend"),
            ResponseSource::Cache => write!(f, "cache"),
        }
    }
}

/// A query answer together with what the gateway knows about it
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub query: Arc<AggregationQuery>,
    pub payload: Arc<Value>,
    pub missing_intervals: Vec<Interval>,
    pub volatile_intervals: Vec<Interval>,
    pub source: ResponseSource,
    /// Key and signature from the cache lookup that preceded execution
    pub cache_ticket: Option<CacheTicket>,
}

impl QueryResponse {
    pub fn from_backend(
        query: Arc<AggregationQuery>,
        response: BackendResponse,
        cache_ticket: Option<CacheTicket>,
    ) -> Self {
        Self {
            query,
            payload: Arc::new(response.payload),
            missing_intervals: response.missing_intervals,
            volatile_intervals: response.volatile_intervals,
            source: ResponseSource::Backend,
            cache_ticket,
        }
    }

    pub fn from_cache(query: Arc<AggregationQuery>, payload: Value) -> Self {
        Self {
            query,
            payload: Arc::new(payload),
            missing_intervals: Vec::new(),
            volatile_intervals: Vec::new(),
            source: ResponseSource::Cache,
            cache_ticket: None,
        }
    }

    pub fn cacheability(&self) -> Cacheability {
        Cacheability::from_intervals(&self.missing_intervals, &self.volatile_intervals)
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_core::QueryType;
    use serde_json::json;

    fn query() -> Arc<AggregationQuery> {
        Arc::new(
            AggregationQuery::builder(QueryType::TopN, "wiki")
                .interval(Interval::parse("2020-01-01/2020-01-08").unwrap())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_backend_response_cacheability() {
        let volatile = vec![Interval::parse("2020-01-07/2020-01-08").unwrap()];
        let response = QueryResponse::from_backend(
            query(),
            BackendResponse::new(json!([])).with_volatile_intervals(volatile),
            None,
        );

        assert_eq!(response.source, ResponseSource::Backend);
        assert_eq!(response.cacheability(), Cacheability::new(false, true));
        assert!(!response.cacheability().is_cacheable());
    }

    #[test]
    fn test_cached_response() {
        let response = QueryResponse::from_cache(query(), json!([{"x": 1}]));
        assert!(response.is_from_cache());
        assert!(response.cacheability().is_cacheable());
        assert_eq!(response.source.to_string(), "cache");
    }
}
