//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_blob_handler, delete_manifest_handler, delete_tag_handler,
    get_blob_handler, get_manifest_handler, get_tag_handler, health_handler, maintenance_handler,
    put_blob_handler, put_manifest_handler, put_tag_handler, stats_handler, tag_history_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
///
/// Blob uploads are not subject to the default body limit.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/manifests/:digest",
            put(put_manifest_handler)
                .get(get_manifest_handler)
                .delete(delete_manifest_handler),
        )
        .route(
            "/blobs/:digest",
            put(put_blob_handler)
                .get(get_blob_handler)
                .delete(delete_blob_handler)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/tags/:reference",
            put(put_tag_handler)
                .get(get_tag_handler)
                .delete(delete_tag_handler),
        )
        .route("/tags/:reference/history", get(tag_history_handler))
        .route("/maintenance", post(maintenance_handler))
        .route("/cache", delete(clear_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Coordinator;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    async fn create_test_app(dir: &TempDir) -> Router {
        let config = Config::new(1 << 20, Duration::from_secs(300));
        let cache = Coordinator::open(config, dir.path()).await.unwrap();
        create_router(AppState::new(cache))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = create_test_app(&dir).await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = create_test_app(&dir).await;

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_blob_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = create_test_app(&dir).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/blobs/sha256:aa")
                    .body(Body::from("layer bytes"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_manifest_not_found() {
        let dir = TempDir::new().unwrap();
        let app = create_test_app(&dir).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/manifests/sha256:nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
