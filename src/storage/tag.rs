//! Tag resolution cache.
//!
//! Maps mutable tag references to digests, remembering a bounded history of
//! the digests each tag pointed at before. Mappings go stale after the
//! configured TTL since tags move upstream.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{validate_digest, write_atomic};
use crate::cache::ttl_elapsed;
use crate::error::{CacheError, Result};

// == Tag History Entry ==
/// A digest a tag used to point at, and when it stopped doing so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagHistoryEntry {
    pub digest: String,
    pub changed_at: DateTime<Utc>,
}

// == Tag Mapping ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMapping {
    pub reference: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
    /// Oldest first
    pub history: VecDeque<TagHistoryEntry>,
}

impl TagMapping {
    fn new(reference: &str, digest: &str, now: DateTime<Utc>) -> Self {
        Self {
            reference: reference.to_string(),
            digest: digest.to_string(),
            created_at: now,
            updated_at: now,
            access_count: 0,
            history: VecDeque::new(),
        }
    }
}

// == Tag Cache ==
#[derive(Debug)]
pub struct TagCache {
    path: PathBuf,
    ttl: Duration,
    history_limit: usize,
    mappings: RwLock<HashMap<String, TagMapping>>,
}

impl TagCache {
    /// Loads the tag table from `path`; a missing or corrupt file starts empty.
    pub async fn load(path: impl Into<PathBuf>, ttl: Duration, history_limit: usize) -> Result<Self> {
        let path = path.into();
        let mappings = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(mappings) => mappings,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "corrupt tag table, starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            ttl,
            history_limit,
            mappings: RwLock::new(mappings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a tag. Stale mappings read as not found.
    pub async fn get_tag_mapping(&self, reference: &str) -> Result<TagMapping> {
        let now = Utc::now();
        let mut mappings = self.mappings.write().await;
        match mappings.get_mut(reference) {
            Some(mapping) if !ttl_elapsed(mapping.updated_at, self.ttl, now) => {
                mapping.access_count += 1;
                Ok(mapping.clone())
            }
            _ => Err(CacheError::NotFound(reference.to_string())),
        }
    }

    /// Points `reference` at `digest`, recording the previous digest in the
    /// history when it changes.
    pub async fn put_tag_mapping(&self, reference: &str, digest: &str) -> Result<TagMapping> {
        if reference.is_empty() {
            return Err(CacheError::InvalidRequest("empty tag reference".to_string()));
        }
        validate_digest(digest)?;

        let now = Utc::now();
        let mut mappings = self.mappings.write().await;
        let mut mapping = mappings
            .get(reference)
            .cloned()
            .unwrap_or_else(|| TagMapping::new(reference, digest, now));

        if mapping.digest != digest {
            mapping.history.push_back(TagHistoryEntry {
                digest: std::mem::replace(&mut mapping.digest, digest.to_string()),
                changed_at: now,
            });
            while mapping.history.len() > self.history_limit {
                mapping.history.pop_front();
            }
            debug!(reference, digest, "tag moved");
        }
        mapping.updated_at = now;

        let previous = mappings.insert(reference.to_string(), mapping.clone());
        if let Err(err) = self.persist_locked(&mappings).await {
            match previous {
                Some(previous) => mappings.insert(reference.to_string(), previous),
                None => mappings.remove(reference),
            };
            return Err(err);
        }
        Ok(mapping)
    }

    /// True when a fresh mapping exists.
    pub async fn has_tag_mapping(&self, reference: &str) -> bool {
        let now = Utc::now();
        self.mappings
            .read()
            .await
            .get(reference)
            .is_some_and(|m| !ttl_elapsed(m.updated_at, self.ttl, now))
    }

    /// Removes a mapping, stale or not.
    pub async fn delete_tag_mapping(&self, reference: &str) -> Result<()> {
        let mut mappings = self.mappings.write().await;
        let Some(removed) = mappings.remove(reference) else {
            return Err(CacheError::NotFound(reference.to_string()));
        };
        if let Err(err) = self.persist_locked(&mappings).await {
            mappings.insert(reference.to_string(), removed);
            return Err(err);
        }
        Ok(())
    }

    /// Prior digests of a tag, oldest first. Available for stale mappings too.
    pub async fn get_tag_history(&self, reference: &str) -> Result<Vec<TagHistoryEntry>> {
        self.mappings
            .read()
            .await
            .get(reference)
            .map(|m| m.history.iter().cloned().collect())
            .ok_or_else(|| CacheError::NotFound(reference.to_string()))
    }

    pub async fn clear(&self) -> Result<()> {
        let mut mappings = self.mappings.write().await;
        let previous = std::mem::take(&mut *mappings);
        if let Err(err) = self.persist_locked(&mappings).await {
            *mappings = previous;
            return Err(err);
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }

    /// Writes the table while the caller still holds the lock, so writes
    /// land in the same order as the mutations. Callers undo their change
    /// when this fails, keeping memory and disk in step.
    async fn persist_locked(&self, mappings: &HashMap<String, TagMapping>) -> Result<()> {
        let bytes = serde_json::to_vec(mappings)?;
        write_atomic(&self.path, &bytes).await
    }
}
