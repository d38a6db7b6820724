//! Core types for the query gateway
//!
//! The aggregation query model, time interval arithmetic and the error type
//! shared by the gateway crates.

pub mod error;
pub mod interval;
pub mod types;

pub use error::{QueryError, Result};
pub use interval::{simplify, Interval};
pub use types::*;
