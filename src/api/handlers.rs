//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tokio::io::AsyncReadExt;

use crate::cache::{manifest_key, Coordinator, PutOptions};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, HealthResponse, MaintenanceResponse, ManifestResponse, PinQuery,
    PutManifestRequest, PutResponse, PutTagRequest, StatsResponse, TagHistoryResponse,
    TagResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The cache coordinator. It synchronizes internally.
    pub cache: Arc<Coordinator>,
}

impl AppState {
    pub fn new(cache: Coordinator) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Opens the coordinator at the configured storage root.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let root: PathBuf = config.storage_root.clone();
        let cache = Coordinator::open(config.clone(), root).await?;
        Ok(Self::new(cache))
    }
}

// == Manifests ==

/// Handler for PUT /manifests/:digest
pub async fn put_manifest_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
    Query(pin): Query<PinQuery>,
    Json(req): Json<PutManifestRequest>,
) -> Result<Json<PutResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = manifest_key(&digest);
    let options = PutOptions { pinned: pin.pinned };
    state
        .cache
        .put_manifest_with(&digest, &req.into_manifest(), options)
        .await?;
    let size = state.cache.index_entry(&key).await.map(|entry| entry.size);

    Ok(Json(PutResponse::new(digest, size)))
}

/// Handler for GET /manifests/:digest
pub async fn get_manifest_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Json<ManifestResponse>> {
    let manifest = state.cache.get_manifest(&digest).await?;
    Ok(Json(ManifestResponse::new(digest, manifest)))
}

/// Handler for DELETE /manifests/:digest
pub async fn delete_manifest_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete_manifest(&digest).await?;
    Ok(Json(DeleteResponse::new(digest)))
}

// == Blobs ==

/// Handler for PUT /blobs/:digest
///
/// The raw request body is the blob.
pub async fn put_blob_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
    Query(pin): Query<PinQuery>,
    body: Bytes,
) -> Result<Json<PutResponse>> {
    let options = PutOptions { pinned: pin.pinned };
    let size = state
        .cache
        .put_blob_with(&digest, body.as_ref(), options)
        .await?;
    Ok(Json(PutResponse::new(digest, Some(size))))
}

/// Handler for GET /blobs/:digest
pub async fn get_blob_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Response> {
    let mut file = state.cache.get_blob(&digest).await?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

/// Handler for DELETE /blobs/:digest
pub async fn delete_blob_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete_blob(&digest).await?;
    Ok(Json(DeleteResponse::new(digest)))
}

// == Tags ==

/// Handler for PUT /tags/:reference
pub async fn put_tag_handler(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(req): Json<PutTagRequest>,
) -> Result<Json<TagResponse>> {
    if state.cache.is_closed() {
        return Err(CacheError::Closed);
    }
    let mapping = state.cache.tags().put_tag_mapping(&reference, &req.digest).await?;
    Ok(Json(mapping.into()))
}

/// Handler for GET /tags/:reference
pub async fn get_tag_handler(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TagResponse>> {
    let mapping = state.cache.tags().get_tag_mapping(&reference).await?;
    Ok(Json(mapping.into()))
}

/// Handler for DELETE /tags/:reference
pub async fn delete_tag_handler(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.tags().delete_tag_mapping(&reference).await?;
    Ok(Json(DeleteResponse::new(reference)))
}

/// Handler for GET /tags/:reference/history
pub async fn tag_history_handler(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TagHistoryResponse>> {
    let history = state.cache.tags().get_tag_history(&reference).await?;
    Ok(Json(TagHistoryResponse { reference, history }))
}

// == Cache ==

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.get_stats().await;
    let metrics = state.cache.get_metrics().await;
    Json(StatsResponse::new(stats, &metrics))
}

/// Handler for POST /maintenance
pub async fn maintenance_handler(
    State(state): State<AppState>,
) -> Result<Json<MaintenanceResponse>> {
    let report = state.cache.run_maintenance().await?;
    Ok(Json(report.into()))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<DeleteResponse>> {
    state.cache.clear().await?;
    Ok(Json(DeleteResponse::new("cache")))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.cache.is_closed() {
        Json(HealthResponse::closing())
    } else {
        Json(HealthResponse::healthy())
    }
}
