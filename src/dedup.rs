//! TTL dedup cache of fully-processed email ids.
//!
//! The sole idempotence barrier against double-sending a reply when a later
//! batch submission re-discovers the same item (e.g. an overlapping poll
//! window from the provider). Entries self-expire after the TTL; expiry is
//! lazy, performed on the next check or insert. Shared process-wide.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// TTL map of item id → time it was last fully processed.
pub struct DedupCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    /// Create a cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Whether `item_id` was fully processed within the TTL.
    pub async fn is_processed(&self, item_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        Self::evict_expired(&mut entries, self.ttl);
        entries.contains_key(item_id)
    }

    /// Record `item_id` as fully processed. Idempotent; re-marking
    /// refreshes the entry's timestamp.
    pub async fn mark_processed(&self, item_id: &str) {
        let mut entries = self.entries.lock().await;
        Self::evict_expired(&mut entries, self.ttl);
        entries.insert(item_id.to_string(), Instant::now());
        debug!(item_id, "Marked item as processed");
    }

    /// Number of live (non-expired) entries.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        Self::evict_expired(&mut entries, self.ttl);
        entries.len()
    }

    /// Whether the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict_expired(entries: &mut HashMap<String, Instant>, ttl: Duration) {
        let now = Instant::now();
        entries.retain(|_, &mut marked_at| now.duration_since(marked_at) <= ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn marked_items_report_processed() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(!cache.is_processed("email-1").await);

        cache.mark_processed("email-1").await;
        assert!(cache.is_processed("email-1").await);
        assert!(!cache.is_processed("email-2").await);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = DedupCache::new(Duration::from_secs(60));
        cache.mark_processed("email-1").await;

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(cache.is_processed("email-1").await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!cache.is_processed("email-1").await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_is_idempotent() {
        let cache = DedupCache::new(Duration::from_secs(60));
        cache.mark_processed("email-1").await;
        cache.mark_processed("email-1").await;

        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remark_refreshes_ttl() {
        let cache = DedupCache::new(Duration::from_secs(60));
        cache.mark_processed("email-1").await;

        tokio::time::sleep(Duration::from_secs(40)).await;
        cache.mark_processed("email-1").await;

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(cache.is_processed("email-1").await);
    }
}
