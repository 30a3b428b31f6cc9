//! Cache-store maintenance endpoints.
//!
//! - `/clearcache` bulk-removes every store.
//! - `/cachestores` lists stores and their bulk-remove flag.
//! - `/clear{alias}` bulk-removes one store, or a comma-separated list of
//!   them, optionally passed through the `caches` query parameter.

use crate::handler::{AsyncResultHandler, HandlerError, SyncResultHandler};
use crate::registry::EndpointRegistry;
use apix_cache::CacheStoreRepo;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Query;
use axum::http::Request;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

pub const CLEAR_PREFIX: &str = "/clear";
pub const CLEAR_ALL_ROUTE: &str = "/clearcache";
pub const LIST_STORES_ROUTE: &str = "/cachestores";
pub const CACHES_QUERY_KEY: &str = "caches";

const NOTHING_TO_CLEAN: &str = "Nothing to clean";

/// Register the cache endpoints in their fixed order.
pub fn register_cache_endpoints(
    registry: EndpointRegistry,
    repo: Arc<dyn CacheStoreRepo>,
) -> EndpointRegistry {
    let clear_all = Arc::clone(&repo);
    let list = Arc::clone(&repo);
    registry
        .add_async(CLEAR_ALL_ROUTE, move || {
            Some(ClearAllStores {
                repo: Arc::clone(&clear_all),
            })
        })
        .add_sync(LIST_STORES_ROUTE, move || {
            Some(ListStores {
                repo: Arc::clone(&list),
            })
        })
        .add_async_when("clear{alias}", clear_store_path, move || {
            Some(ClearStore {
                repo: Arc::clone(&repo),
                aliases: String::new(),
            })
        })
}

/// Matches `/clear{alias}` and returns the path with any `caches` query
/// values appended.
pub fn clear_store_path(request: &Request<Body>) -> Option<String> {
    let path = request.uri().path();
    if !starts_with_ignore_case(path, CLEAR_PREFIX)
        || starts_with_ignore_case(path, CLEAR_ALL_ROUTE)
        || path[1..].contains('/')
    {
        return None;
    }

    let mut resolved = path.to_string();
    if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(request.uri()) {
        let values: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| k == CACHES_QUERY_KEY)
            .map(|(_, v)| v.as_str())
            .collect();
        resolved.push_str(&values.join(","));
    }
    Some(resolved)
}

fn starts_with_ignore_case(path: &str, prefix: &str) -> bool {
    path.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn outcome_text(outcome: Option<bool>) -> String {
    match outcome {
        Some(removed) => removed.to_string(),
        None => NOTHING_TO_CLEAN.to_string(),
    }
}

/// `/clearcache`
pub struct ClearAllStores {
    repo: Arc<dyn CacheStoreRepo>,
}

#[async_trait]
impl AsyncResultHandler for ClearAllStores {
    async fn get_result(&mut self) -> Result<Option<String>, HandlerError> {
        let results = self.repo.bulk_remove_all().await;
        if results.is_empty() {
            return Ok(Some("Failed to clean as no cache instances found".into()));
        }

        let mut out = String::new();
        for (alias, outcome) in results {
            let _ = writeln!(out, "{alias} - {}", outcome_text(outcome));
        }
        Ok(Some(out))
    }
}

/// `/cachestores`
pub struct ListStores {
    repo: Arc<dyn CacheStoreRepo>,
}

impl SyncResultHandler for ListStores {
    fn get_result(&mut self) -> Result<Option<String>, HandlerError> {
        let stores = self.repo.list_cache_stores();
        if stores.is_empty() {
            return Ok(Some("No configured cache stores found.".into()));
        }

        let mut out = String::from("Cache Store Name ---- Is Bulk Remove Enabled?\n\n");
        for (alias, enabled) in stores {
            let _ = writeln!(out, "{alias} ---- {enabled}");
        }
        Ok(Some(out))
    }
}

/// `/clear{alias}`
pub struct ClearStore {
    repo: Arc<dyn CacheStoreRepo>,
    aliases: String,
}

impl ClearStore {
    async fn clear_one(&self, alias: &str) -> Option<bool> {
        match self.repo.get_cache_store(alias) {
            Some(store) => store.bulk_remove().await,
            None => None,
        }
    }
}

#[async_trait]
impl AsyncResultHandler for ClearStore {
    fn set_path(&mut self, path: &str) -> Result<(), HandlerError> {
        if !starts_with_ignore_case(path, CLEAR_PREFIX) {
            return Err(HandlerError::InvalidPath {
                handler: "ClearStore",
                path: path.to_string(),
            });
        }
        self.aliases = path[CLEAR_PREFIX.len()..].to_string();
        debug!(path, aliases = %self.aliases, "Resolved cache store aliases");
        Ok(())
    }

    async fn get_result(&mut self) -> Result<Option<String>, HandlerError> {
        if !self.aliases.contains(',') {
            let text = match self.clear_one(&self.aliases).await {
                Some(removed) => removed.to_string(),
                None => "Nothing to clean OR Required cache store not found.".to_string(),
            };
            return Ok(Some(text));
        }

        let mut out = String::new();
        for alias in self.aliases.split(',') {
            let outcome = self.clear_one(alias).await;
            let _ = writeln!(out, "{alias} - {}", outcome_text(outcome));
        }
        Ok(Some(out))
    }
}
