use crate::store::{CacheStore, CacheStoreRepo};
use apix_core::config::CacheConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// In-process key/value cache store.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    alias: String,
    bulk_remove_enabled: bool,
    entries: Arc<DashMap<String, String>>,
}

impl InMemoryCacheStore {
    pub fn new(alias: impl Into<String>, bulk_remove_enabled: bool) -> Self {
        Self {
            alias: alias.into(),
            bulk_remove_enabled,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn bulk_remove_enabled(&self) -> bool {
        self.bulk_remove_enabled
    }

    async fn bulk_remove(&self) -> Option<bool> {
        if !self.bulk_remove_enabled {
            return None;
        }
        let removed = self.entries.len();
        self.entries.clear();
        debug!(store = %self.alias, removed, "Cache store cleared");
        Some(removed > 0)
    }
}

/// Repository over a fixed set of stores. Alias lookup ignores ASCII case.
#[derive(Clone, Default)]
pub struct InMemoryCacheStoreRepo {
    stores: Arc<DashMap<String, Arc<dyn CacheStore>>>,
}

impl InMemoryCacheStoreRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one empty in-memory store per configured alias.
    pub fn from_config(config: &CacheConfig) -> Self {
        let repo = Self::new();
        for store in &config.stores {
            repo.register(Arc::new(InMemoryCacheStore::new(
                store.alias.clone(),
                store.bulk_remove_enabled,
            )));
        }
        repo
    }

    /// Register a store. A store with the same alias is replaced.
    pub fn register(&self, store: Arc<dyn CacheStore>) {
        let key = store.alias().to_ascii_lowercase();
        debug!(store = %store.alias(), "Registered cache store");
        self.stores.insert(key, store);
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CacheStore>> {
        self.stores.iter().map(|s| Arc::clone(s.value())).collect()
    }
}

#[async_trait]
impl CacheStoreRepo for InMemoryCacheStoreRepo {
    async fn bulk_remove_all(&self) -> BTreeMap<String, Option<bool>> {
        // Never hold a DashMap shard guard across an await.
        let mut results = BTreeMap::new();
        for store in self.snapshot() {
            let outcome = store.bulk_remove().await;
            results.insert(store.alias().to_string(), outcome);
        }
        results
    }

    fn list_cache_stores(&self) -> BTreeMap<String, bool> {
        self.stores
            .iter()
            .map(|s| (s.value().alias().to_string(), s.value().bulk_remove_enabled()))
            .collect()
    }

    fn get_cache_store(&self, alias: &str) -> Option<Arc<dyn CacheStore>> {
        self.stores
            .get(&alias.to_ascii_lowercase())
            .map(|s| Arc::clone(s.value()))
    }
}
