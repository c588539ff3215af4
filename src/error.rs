//! Error types for the OCI content cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid cache configuration, raised at construction
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Key, digest or tag reference not present in the cache
    #[error("Not found: {0}")]
    NotFound(String),

    /// Digest or reference that cannot be mapped onto storage
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Payload or index storage failure
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Index, tag table or manifest (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coordinator has been closed
    #[error("Cache is closed")]
    Closed,

    /// Malformed request body or reference
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Returns true for the "not found" condition, including payload files
    /// that disappeared from storage.
    pub fn is_not_found(&self) -> bool {
        match self {
            CacheError::NotFound(_) => true,
            CacheError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            match &self {
                CacheError::InvalidDigest(_)
                | CacheError::InvalidRequest(_)
                | CacheError::Config(_) => StatusCode::BAD_REQUEST,
                CacheError::Closed => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
