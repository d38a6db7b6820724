//! Error types for the result cache
//!
//! None of these ever escape [`CachePolicy`](crate::CachePolicy); they exist so
//! that stores and the canonicalizer can report what went wrong before the
//! policy degrades the failure to a miss or a skipped write.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A query or response has no canonical encoding
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store could not be reached or rejected the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The backing store did not answer in time
    #[error("Store timeout after {0}ms")]
    StoreTimeout(u64),

    /// A stored value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
