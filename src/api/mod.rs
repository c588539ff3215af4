//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT|GET|DELETE /manifests/:digest` - Manifest payloads
//! - `PUT|GET|DELETE /blobs/:digest` - Blob payloads (raw body)
//! - `PUT|GET|DELETE /tags/:reference` - Tag resolution
//! - `GET /tags/:reference/history` - Prior digests of a tag
//! - `POST /maintenance` - Run a maintenance pass now
//! - `DELETE /cache` - Clear the whole cache
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
