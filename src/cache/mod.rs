//! Category-partitioned TTL cache for idempotent reads
//!
//! Entries expire lazily on read. Invalidation always drops a whole category.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use focus_types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;

/// Invalidation scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Tasks,
    Projects,
    Tags,
    Analytics,
    Reviews,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 5] = [
        CacheCategory::Tasks,
        CacheCategory::Projects,
        CacheCategory::Tags,
        CacheCategory::Analytics,
        CacheCategory::Reviews,
    ];

    pub fn for_entity(entity: EntityType) -> Self {
        match entity {
            EntityType::Task => CacheCategory::Tasks,
            EntityType::Project => CacheCategory::Projects,
            EntityType::Tag => CacheCategory::Tags,
        }
    }

    /// Categories a write to `entity` makes stale.
    ///
    /// Project and tag reads embed task counts and task reads embed project
    /// names, so a task or project write drops every category. Deleting a
    /// project deletes its tasks.
    pub fn invalidated_by(entity: EntityType) -> Vec<CacheCategory> {
        match entity {
            EntityType::Task => vec![
                CacheCategory::Tasks,
                CacheCategory::Projects,
                CacheCategory::Tags,
                CacheCategory::Analytics,
                CacheCategory::Reviews,
            ],
            EntityType::Project => vec![
                CacheCategory::Projects,
                CacheCategory::Tasks,
                CacheCategory::Tags,
                CacheCategory::Reviews,
                CacheCategory::Analytics,
            ],
            EntityType::Tag => vec![
                CacheCategory::Tags,
                CacheCategory::Tasks,
                CacheCategory::Analytics,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Tasks => "tasks",
            CacheCategory::Projects => "projects",
            CacheCategory::Tags => "tags",
            CacheCategory::Analytics => "analytics",
            CacheCategory::Reviews => "reviews",
        }
    }
}

impl std::fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deterministic key for any serializable request.
///
/// `serde_json::Value` objects are ordered maps, so the digest does not
/// depend on field or key order in the input.
pub fn cache_key<T: Serialize + ?Sized>(value: &T) -> String {
    let canonical = serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    expires_at: Instant,
}

/// A cached value and how old it is
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub value: Value,
    pub age: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<(CacheCategory, String), CacheEntry>,
    stats: CacheStats,
}

/// In-process cache owned by the tool façade
pub struct CacheStore {
    ttls: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl CacheStore {
    pub fn new(ttls: CacheConfig) -> Self {
        Self {
            ttls,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // A panic while holding the lock leaves only counters half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ttl(&self, category: CacheCategory) -> Duration {
        self.ttls.ttl(category)
    }

    pub fn get(&self, category: CacheCategory, key: &str) -> Option<CacheHit> {
        let now = Instant::now();
        let mut inner = self.lock();
        let slot = (category, key.to_string());

        match inner.entries.get(&slot) {
            Some(entry) if entry.expires_at > now => {
                let hit = CacheHit {
                    value: entry.value.clone(),
                    age: now.duration_since(entry.stored_at),
                };
                inner.stats.hits += 1;
                debug!(%category, cache_hit = true, "Cache hit");
                Some(hit)
            }
            Some(_) => {
                inner.entries.remove(&slot);
                inner.stats.expired += 1;
                inner.stats.misses += 1;
                debug!(%category, cache_hit = false, "Cache entry expired");
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn set(&self, category: CacheCategory, key: impl Into<String>, value: Value) {
        let ttl = self.ttl(category);
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        self.lock().entries.insert(
            (category, key.into()),
            CacheEntry {
                value,
                stored_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Drop every entry in `category`; returns how many were removed
    pub fn invalidate(&self, category: CacheCategory) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(c, _), _| *c != category);
        let removed = before - inner.entries.len();
        inner.stats.invalidations += 1;
        debug!(%category, removed, "Cache category invalidated");
        removed
    }

    /// Invalidate everything a write to `entity` makes stale
    pub fn invalidate_for(&self, entity: EntityType) -> usize {
        CacheCategory::invalidated_by(entity)
            .into_iter()
            .map(|category| self.invalidate(category))
            .sum()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats.invalidations += 1;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
