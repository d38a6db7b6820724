use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid interval '{input}': {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("Backend timeout after {0}ms")]
    BackendTimeout(u64),
}

impl QueryError {
    pub fn invalid_interval(input: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidInterval {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
