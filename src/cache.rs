// Time-bounded in-memory cache shared by request handlers.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// A map whose entries stop being visible once they are older than the TTL.
///
/// Expired entries are skipped by lookups but only dropped on
/// [`TtlCache::purge_expired`] or when overwritten.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Store a value, restarting its TTL.
    pub async fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now()).await;
    }

    pub(crate) async fn insert_at(&self, key: K, value: V, stored_at: Instant) {
        self.entries
            .write()
            .await
            .insert(key, Entry { value, stored_at });
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().await;
        guard
            .get(key)
            .filter(|entry| entry.is_live(self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// Mutate a live entry in place under the write lock. The entry's TTL
    /// restarts, so actively used keys do not expire.
    pub async fn update<T>(&self, key: &K, f: impl FnOnce(&mut V) -> T) -> Option<T> {
        let mut guard = self.entries.write().await;
        let entry = guard.get_mut(key).filter(|e| e.is_live(self.ttl))?;
        let out = f(&mut entry.value);
        entry.stored_at = Instant::now();
        Some(out)
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live(self.ttl));
        before - guard.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let guard = self.entries.read().await;
        guard.values().filter(|e| e.is_live(self.ttl)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
