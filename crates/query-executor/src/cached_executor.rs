//! Cached Query Executor
//!
//! Wraps a [`QueryBackend`] with the signature-validated result cache. Lookups
//! happen before execution; writes happen in the response pipeline.

use crate::backend::QueryBackend;
use crate::cache_stage::CacheWriteStage;
use crate::pipeline::{Pipeline, ResponseLogStage, ResponseStage};
use crate::response::QueryResponse;
use query_cache::{CacheMetrics, CachePolicy};
use query_core::{AggregationQuery, Result};
use std::sync::Arc;
use tracing::debug;

/// A query executor with built-in caching support
pub struct CachedQueryExecutor {
    /// Computes answers on cache misses
    backend: Arc<dyn QueryBackend>,
    /// Read and write policy
    policy: Arc<CachePolicy>,
    /// Stage writing backend answers to the cache
    cache_stage: Arc<CacheWriteStage>,
    /// Stages every response passes through
    pipeline: Pipeline,
}

impl CachedQueryExecutor {
    /// Create an executor with the default pipeline (log stage, then cache stage)
    pub fn new(backend: Arc<dyn QueryBackend>, policy: Arc<CachePolicy>) -> Self {
        Self::with_stages(backend, policy, Vec::new())
    }

    /// Create an executor running `stages` before the cache stage
    pub fn with_stages(
        backend: Arc<dyn QueryBackend>,
        policy: Arc<CachePolicy>,
        stages: Vec<Arc<dyn ResponseStage>>,
    ) -> Self {
        let cache_stage = Arc::new(CacheWriteStage::new(Arc::clone(&policy)));

        let mut builder = Pipeline::builder().stage(ResponseLogStage);
        for stage in stages {
            builder = builder.shared_stage(stage);
        }
        let pipeline = builder
            .shared_stage(Arc::clone(&cache_stage) as Arc<dyn ResponseStage>)
            .build();

        Self {
            backend,
            policy,
            cache_stage,
            pipeline,
        }
    }

    /// Execute a query with caching support
    ///
    /// A valid cached answer is returned without calling the backend. Otherwise
    /// the backend answer is run through the pipeline, which offers it to the
    /// cache in the background.
    pub async fn execute(&self, query: AggregationQuery) -> Result<QueryResponse> {
        query.validate()?;
        let query = Arc::new(query);

        let lookup = self.policy.lookup(&query).await;
        if let Some(payload) = lookup.value {
            let response = QueryResponse::from_cache(query, payload);
            return Ok(self.pipeline.process(response).await);
        }

        debug!(
            backend = self.backend.name(),
            query_id = query.query_id().unwrap_or("-"),
            "Cache miss, executing query"
        );
        let answer = self.backend.execute(&query).await?;
        let response = QueryResponse::from_backend(query, answer, lookup.ticket);
        Ok(self.pipeline.process(response).await)
    }

    /// Execute without caching (bypass cache)
    pub async fn execute_uncached(&self, query: AggregationQuery) -> Result<QueryResponse> {
        query.validate()?;
        let query = Arc::new(query);
        let answer = self.backend.execute(&query).await?;
        Ok(QueryResponse::from_backend(query, answer, None))
    }

    /// Wait for background cache writes submitted so far
    pub async fn flush_cache_writes(&self) {
        self.cache_stage.wait_idle().await;
    }

    /// Get cache metrics
    pub fn cache_metrics(&self) -> Arc<CacheMetrics> {
        self.policy.metrics()
    }

    /// Get the cache policy
    pub fn policy(&self) -> &Arc<CachePolicy> {
        &self.policy
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Check if caching is enabled
    pub fn is_cache_enabled(&self) -> bool {
        self.policy.is_enabled()
    }
}
