//! In-memory caches used by [`super::ApiClient`].
//!
//! Nothing here expires on its own except [`TtlCache`]; callers prime on
//! create/update and invalidate on delete.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::models::Identified;

/// Lifetime of candidate evaluation summaries.
pub const EVALUATION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Entities keyed by id.
#[derive(Debug)]
pub struct EntityCache<T> {
    entries: Arc<RwLock<HashMap<String, T>>>,
}

impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Identified + Clone> EntityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prime(&self, item: &T) {
        self.entries.write().insert(item.id().to_string(), item.clone());
    }

    pub fn prime_all<'a, I>(&self, items: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut entries = self.entries.write();
        for item in items {
            entries.insert(item.id().to_string(), item.clone());
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries.read().get(id).cloned()
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.write().remove(id);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// One cached list, refreshed on demand.
#[derive(Debug)]
pub struct ListCache<T> {
    items: RwLock<Option<Vec<T>>>,
}

impl<T> Default for ListCache<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(None),
        }
    }
}

impl<T: Clone> ListCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Vec<T>> {
        self.items.read().clone()
    }

    pub fn set(&self, items: Vec<T>) {
        *self.items.write() = Some(items);
    }

    pub fn invalidate(&self) {
        *self.items.write() = None;
    }

    /// Cached list, or the result of `fetch` when empty or `force` is set.
    /// A failed fetch leaves the cache untouched.
    pub async fn get_or_fetch<F, Fut, E>(&self, force: bool, fetch: F) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if !force {
            if let Some(items) = self.get() {
                return Ok(items);
            }
        }
        let items = fetch().await?;
        self.set(items.clone());
        Ok(items)
    }
}

/// Values keyed by string that expire after a fixed time.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, T)>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(EVALUATION_CACHE_TTL)
    }
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(key.into(), (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: Clone> TtlCache<T> {
    /// Fresh value for `key`. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((stored, value)) if stored.elapsed() < self.ttl => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(key);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        label: &'static str,
    }

    impl Identified for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, label: &'static str) -> Item {
        Item {
            id: id.to_string(),
            label,
        }
    }

    #[test]
    fn test_entity_cache_prime_and_invalidate() {
        let cache = EntityCache::new();
        cache.prime(&item("a", "first"));
        cache.prime_all(&[item("b", "second"), item("a", "replaced")]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().label, "replaced");

        let shared = cache.clone();
        shared.invalidate("a");
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(shared.is_empty());
    }

    #[tokio::test]
    async fn test_list_cache_force_refresh() {
        let cache = ListCache::new();
        let first: Result<Vec<u32>, ()> = cache.get_or_fetch(false, || async { Ok(vec![1]) }).await;
        assert_eq!(first, Ok(vec![1]));

        let cached: Result<Vec<u32>, ()> = cache.get_or_fetch(false, || async { Ok(vec![2]) }).await;
        assert_eq!(cached, Ok(vec![1]));

        let forced: Result<Vec<u32>, ()> = cache.get_or_fetch(true, || async { Ok(vec![3]) }).await;
        assert_eq!(forced, Ok(vec![3]));

        let failed: Result<Vec<u32>, &str> = cache.get_or_fetch(true, || async { Err("down") }).await;
        assert_eq!(failed, Err("down"));
        assert_eq!(cache.get(), Some(vec![3]));

        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_ttl_cache_expiry() {
        let cache = TtlCache::default();
        assert_eq!(cache.ttl(), Duration::from_secs(60));
        cache.insert("c1", vec![1, 2]);
        assert_eq!(cache.get("c1"), Some(vec![1, 2]));
        cache.invalidate("c1");
        assert_eq!(cache.get("c1"), None);

        let expired = TtlCache::new(Duration::ZERO);
        expired.insert("c1", 1);
        assert_eq!(expired.get("c1"), None);
    }
}
