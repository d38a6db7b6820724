//! Cached execution of aggregation queries
//!
//! [`CachedQueryExecutor`] consults the result cache, falls back to a
//! [`QueryBackend`], and runs every answer through a response [`Pipeline`]
//! whose [`CacheWriteStage`] stores complete answers in the background.

pub mod backend;
pub mod cache_stage;
pub mod cached_executor;
pub mod pipeline;
pub mod response;

pub use backend::{BackendResponse, QueryBackend, StaticBackend};
pub use cache_stage::CacheWriteStage;
pub use cached_executor::CachedQueryExecutor;
pub use pipeline::{Pipeline, PipelineBuilder, ResponseLogStage, ResponseStage};
pub use response::{QueryResponse, ResponseSource};
