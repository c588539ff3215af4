//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{MaintenanceReport, Metrics, Stats};
use crate::storage::{Manifest, TagHistoryEntry, TagMapping};

/// Response body for PUT /manifests/:digest and PUT /blobs/:digest
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    /// Success message
    pub message: String,
    /// The digest that was stored
    pub digest: String,
    /// Bytes stored, when known to the handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl PutResponse {
    pub fn new(digest: impl Into<String>, size: Option<u64>) -> Self {
        let digest = digest.into();
        Self {
            message: format!("'{}' stored successfully", digest),
            digest,
            size,
        }
    }
}

/// Response body for GET /manifests/:digest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestResponse {
    pub digest: String,
    pub media_type: String,
    pub content: String,
}

impl ManifestResponse {
    pub fn new(digest: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            digest: digest.into(),
            media_type: manifest.media_type,
            content: manifest.content,
        }
    }
}

/// Response body for every DELETE endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The digest or reference that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("'{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for GET and PUT /tags/:reference
#[derive(Debug, Clone, Serialize)]
pub struct TagResponse {
    pub reference: String,
    pub digest: String,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
}

impl From<TagMapping> for TagResponse {
    fn from(mapping: TagMapping) -> Self {
        Self {
            reference: mapping.reference,
            digest: mapping.digest,
            updated_at: mapping.updated_at,
            access_count: mapping.access_count,
        }
    }
}

/// Response body for GET /tags/:reference/history
#[derive(Debug, Clone, Serialize)]
pub struct TagHistoryResponse {
    pub reference: String,
    /// Prior digests, oldest first
    pub history: Vec<TagHistoryEntry>,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions (expiry, size pressure and compaction)
    pub evictions: u64,
    /// Number of storage or persistence failures
    pub errors: u64,
    /// Current number of indexed entries
    pub total_entries: usize,
    /// Entries past their TTL that maintenance has not removed yet
    pub expired_entries: usize,
    /// Indexed payload bytes
    pub total_size: u64,
    /// Size budget
    pub max_size: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub average_access_count: f64,
    pub last_compaction: Option<DateTime<Utc>>,
}

impl StatsResponse {
    pub fn new(stats: Stats, metrics: &Metrics) -> Self {
        Self {
            hits: metrics.hits,
            misses: metrics.misses,
            evictions: stats.evictions,
            errors: stats.errors,
            total_entries: stats.total_entries,
            expired_entries: stats.expired_entries,
            total_size: stats.total_size,
            max_size: stats.max_size,
            hit_rate: stats.hit_rate,
            average_access_count: stats.average_access_count,
            last_compaction: stats.last_compaction,
        }
    }
}

/// Response body for POST /maintenance
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub expired: usize,
    pub evicted: usize,
    pub compacted: usize,
    pub errors: usize,
    pub persisted: bool,
}

impl From<MaintenanceReport> for MaintenanceResponse {
    fn from(report: MaintenanceReport) -> Self {
        Self {
            expired: report.expired,
            evicted: report.evicted,
            compacted: report.compacted,
            errors: report.errors,
            persisted: report.persisted,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// The cache has been closed and no longer accepts writes.
    pub fn closing() -> Self {
        Self {
            status: "closing".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_response_serialize() {
        let resp = PutResponse::new("sha256:aa", Some(10));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("sha256:aa"));
        assert!(json.contains("\"size\":10"));

        let json = serde_json::to_string(&PutResponse::new("sha256:bb", None)).unwrap();
        assert!(!json.contains("size"));
    }

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("app:latest");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("app:latest"));
        assert!(json.contains("deleted"));
    }

    #[test]
    fn test_stats_response_from_stats() {
        let stats = Stats {
            total_entries: 2,
            expired_entries: 1,
            total_size: 30,
            max_size: 100,
            hit_rate: 0.8,
            evictions: 5,
            errors: 0,
            last_compaction: None,
            average_access_count: 1.5,
        };
        let metrics = Metrics {
            hits: 8,
            misses: 2,
            ..Metrics::default()
        };

        let resp = StatsResponse::new(stats, &metrics);
        assert_eq!(resp.hits, 8);
        assert_eq!(resp.misses, 2);
        assert_eq!(resp.total_size, 30);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_maintenance_response_from_report() {
        let report = MaintenanceReport {
            expired: 1,
            evicted: 2,
            persisted: true,
            ..MaintenanceReport::default()
        };
        let resp = MaintenanceResponse::from(report);
        assert_eq!(resp.evicted, 2);
        assert!(resp.persisted);
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_string(&HealthResponse::healthy()).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
        assert_eq!(HealthResponse::closing().status, "closing");
    }

    #[test]
    fn test_error_response_serialize() {
        let json = serde_json::to_string(&ErrorResponse::new("Something went wrong")).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
