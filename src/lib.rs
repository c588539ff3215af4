//! OCI content cache
//!
//! Bounded, disk-backed cache for OCI manifests, blobs and tag mappings with
//! TTL expiry, size-pressure eviction and background maintenance.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
mod tasks;

pub use api::AppState;
pub use cache::Coordinator;
pub use config::Config;
pub use error::{CacheError, Result};
pub use storage::Manifest;
