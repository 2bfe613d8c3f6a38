//! In-memory LRU cache of issued signed URLs.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use lru::LruCache;
use tokio::sync::Mutex;

use crate::path::normalize_avatar_path;
use crate::types::AvatarPath;

/// Maximum number of signed URLs kept in memory.
pub const MAX_CACHE_ENTRIES: usize = 500;

/// Cache key for a path signed with a given TTL.
#[must_use]
pub fn cache_key(path: &AvatarPath, ttl_seconds: u64) -> String {
    format!("{path}|{ttl_seconds}")
}

/// Recency-ordered map from `path|ttl` to a previously issued signed URL.
///
/// Entries carry no expiry of their own; callers bound staleness through the TTL they sign with.
pub struct SignedUrlCache {
    entries: Mutex<LruCache<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SignedUrlCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_ENTRIES)
    }

    /// Creates a cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a URL and marks the key as most recently used.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        if let Some(url) = entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Signed URL cache hit: {key}");
            Some(url.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!("Signed URL cache miss: {key}");
            None
        }
    }

    /// Inserts or refreshes an entry, evicting the least recently used one when full.
    pub async fn set(&self, key: String, url: String) {
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(key, url)
            && !entries.contains(&evicted)
        {
            debug!("Evicted signed URL for {evicted}");
        }
    }

    /// Drops every cached TTL variant of an avatar path.
    pub async fn invalidate(&self, path: &str) {
        let Some(path) = normalize_avatar_path(Some(path)) else {
            return;
        };
        let prefix = format!("{path}|");

        let mut entries = self.entries.lock().await;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            entries.pop(key);
        }
        debug!("Invalidated {} cached URLs for {path}", stale.len());
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Returns hit/miss counters and the current size.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: self.len().await,
        }
    }
}

impl Default for SignedUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignedUrlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrlCache")
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups that hit.
    pub hit_rate: f64,
    pub size: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signed URL cache: {} entries, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> String {
        format!("user{n}/pic.png|86400")
    }

    async fn filled(capacity: usize) -> SignedUrlCache {
        let cache = SignedUrlCache::with_capacity(capacity);
        for n in 0..capacity {
            cache.set(key(n), format!("https://signed/{n}")).await;
        }
        cache
    }

    #[tokio::test]
    async fn evicts_least_recently_used_beyond_capacity() {
        let cache = filled(MAX_CACHE_ENTRIES).await;
        assert_eq!(cache.len().await, MAX_CACHE_ENTRIES);

        cache.set(key(MAX_CACHE_ENTRIES), "https://signed/new".to_string()).await;

        assert_eq!(cache.len().await, MAX_CACHE_ENTRIES);
        assert!(cache.get(&key(0)).await.is_none());
        assert!(cache.get(&key(1)).await.is_some());
        assert!(cache.get(&key(MAX_CACHE_ENTRIES)).await.is_some());
    }

    #[tokio::test]
    async fn get_protects_entry_from_eviction() {
        let cache = filled(MAX_CACHE_ENTRIES).await;
        assert_eq!(cache.get(&key(0)).await.as_deref(), Some("https://signed/0"));

        cache.set(key(MAX_CACHE_ENTRIES), "https://signed/new".to_string()).await;

        assert!(cache.get(&key(0)).await.is_some());
        assert!(cache.get(&key(1)).await.is_none());
    }

    #[tokio::test]
    async fn set_refreshes_existing_key() {
        let cache = filled(3).await;
        cache.set(key(0), "https://signed/replaced".to_string()).await;
        cache.set(key(3), "https://signed/3".to_string()).await;

        assert_eq!(
            cache.get(&key(0)).await.as_deref(),
            Some("https://signed/replaced")
        );
        assert!(cache.get(&key(1)).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_all_ttl_variants_of_one_path() {
        let cache = SignedUrlCache::new();
        cache.set("u1/pic.png|60".to_string(), "a".to_string()).await;
        cache.set("u1/pic.png|86400".to_string(), "b".to_string()).await;
        cache.set("u1/pic.png.bak|60".to_string(), "c".to_string()).await;
        cache.set("u2/pic.png|60".to_string(), "d".to_string()).await;

        cache.invalidate("avatars/u1/pic.png").await;

        assert!(cache.get("u1/pic.png|60").await.is_none());
        assert!(cache.get("u1/pic.png|86400").await.is_none());
        assert!(cache.get("u1/pic.png.bak|60").await.is_some());
        assert!(cache.get("u2/pic.png|60").await.is_some());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = SignedUrlCache::new();
        cache.set(key(1), "x".to_string()).await;
        cache.get(&key(1)).await;
        cache.get(&key(2)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn key_joins_path_and_ttl() {
        let path = normalize_avatar_path(Some("avatar/u1/pic.png")).expect("path");
        assert_eq!(cache_key(&path, 3600), "u1/pic.png|3600");
    }
}
