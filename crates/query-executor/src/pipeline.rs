//! Response-processing pipeline
//!
//! A [`Pipeline`] is an ordered list of stages; each stage receives the
//! response produced by the previous one.

use crate::response::QueryResponse;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One step applied to every response
#[async_trait]
pub trait ResponseStage: Send + Sync {
    async fn process(&self, response: QueryResponse) -> QueryResponse;

    fn name(&self) -> &str;
}

/// Ordered sequence of response stages
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn ResponseStage>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run `response` through every stage in order
    pub async fn process(&self, mut response: QueryResponse) -> QueryResponse {
        for stage in &self.stages {
            response = stage.process(response).await;
        }
        response
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn ResponseStage>>,
}

impl PipelineBuilder {
    /// Append a stage after the ones already added
    pub fn stage(mut self, stage: impl ResponseStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage
    pub fn shared_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// Logs a summary of each response
#[derive(Debug, Default)]
pub struct ResponseLogStage;

#[async_trait]
impl ResponseStage for ResponseLogStage {
    async fn process(&self, response: QueryResponse) -> QueryResponse {
        debug!(
            query_id = response.query.query_id().unwrap_or("-"),
            source = %response.source,
            missing = response.missing_intervals.len(),
            volatile = response.volatile_intervals.len(),
            "Query response"
        );
        response
    }

    fn name(&self) -> &str {
        "log"
    }
}
