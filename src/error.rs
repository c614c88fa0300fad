//! Errors raised at the data-entry and storage boundary.
//!
//! The scoring engine itself is total and never returns these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("invalid {field} status: {value:?}")]
    InvalidStatus { field: &'static str, value: String },

    #[error("invalid risk level: {0:?} (expected LOW, MEDIUM or HIGH)")]
    InvalidRiskLevel(String),

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("student already exists: {0}")]
    StudentExists(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
