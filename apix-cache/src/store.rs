use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named cache that can drop all of its keys at once.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Alias the store is addressed by in `/clear{alias}`.
    fn alias(&self) -> &str;

    fn bulk_remove_enabled(&self) -> bool;

    /// Remove every key held by this store.
    ///
    /// `Some(true)` when keys were removed, `Some(false)` when there was
    /// nothing to remove, `None` when the store does not support it.
    async fn bulk_remove(&self) -> Option<bool>;
}

/// The set of cache stores an application exposes.
#[async_trait]
pub trait CacheStoreRepo: Send + Sync {
    /// Bulk-remove every store, keyed by alias.
    async fn bulk_remove_all(&self) -> BTreeMap<String, Option<bool>>;

    /// Every store alias with its bulk-remove flag.
    fn list_cache_stores(&self) -> BTreeMap<String, bool>;

    fn get_cache_store(&self, alias: &str) -> Option<Arc<dyn CacheStore>>;
}
