//! Endpoint registration.
//!
//! Endpoints are collected once at startup through [`EndpointRegistry`] and
//! frozen into an [`EndpointDispatcher`]. The branch list is immutable after
//! `build()`, so request tasks read it without synchronisation.

use crate::dispatcher::EndpointDispatcher;
use crate::handler::{AsyncResultHandler, HandlerFactory, SyncResultHandler};
use apix_observability::MetricsCollector;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tracing::info;

/// Computes whether a request belongs to an endpoint, and if so the path
/// handed to its handler.
pub type PathPredicate = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// How a branch decides it owns a request.
#[derive(Clone)]
pub enum Matcher {
    /// Exact segment match against a normalized path.
    Exact(String),
    Predicate(PathPredicate),
}

impl Matcher {
    /// `Some(resolved_path)` when the request belongs to this branch.
    pub fn resolve(&self, request: &Request<Body>) -> Option<String> {
        match self {
            Matcher::Exact(path) => {
                matches_exact(path, request.uri().path()).then(|| path.clone())
            }
            Matcher::Predicate(predicate) => predicate(request),
        }
    }
}

/// One registered dynamic endpoint.
#[derive(Clone)]
pub struct Branch {
    /// Registered path, or the name given to a predicate endpoint.
    pub name: String,
    /// Type name of the handler, for diagnostics.
    pub handler_type: &'static str,
    pub matcher: Matcher,
    pub factory: HandlerFactory,
}

/// Builder for the dynamic endpoint table.
pub struct EndpointRegistry {
    branches: Vec<Branch>,
    failure_status: StatusCode,
    metrics: Arc<MetricsCollector>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            failure_status: StatusCode::OK,
            metrics: Arc::new(MetricsCollector::disabled()),
        }
    }

    /// Status written with the `"Failed"` body. Defaults to 200.
    pub fn failure_status(mut self, status: StatusCode) -> Self {
        self.failure_status = status;
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Serve `path` with a synchronous handler.
    pub fn add_sync<F, H>(self, path: &str, factory: F) -> Self
    where
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: SyncResultHandler + 'static,
    {
        let path = normalize_path(path);
        self.push(
            path.clone(),
            std::any::type_name::<H>(),
            Matcher::Exact(path),
            HandlerFactory::sync(factory),
        )
    }

    /// Serve `path` with an asynchronous handler.
    pub fn add_async<F, H>(self, path: &str, factory: F) -> Self
    where
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: AsyncResultHandler + 'static,
    {
        let path = normalize_path(path);
        self.push(
            path.clone(),
            std::any::type_name::<H>(),
            Matcher::Exact(path),
            HandlerFactory::r#async(factory),
        )
    }

    /// Serve every request `predicate` accepts with a synchronous handler.
    pub fn add_sync_when<P, F, H>(self, name: &str, predicate: P, factory: F) -> Self
    where
        P: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: SyncResultHandler + 'static,
    {
        self.push(
            name.to_string(),
            std::any::type_name::<H>(),
            Matcher::Predicate(Arc::new(predicate)),
            HandlerFactory::sync(factory),
        )
    }

    /// Serve every request `predicate` accepts with an asynchronous handler.
    pub fn add_async_when<P, F, H>(self, name: &str, predicate: P, factory: F) -> Self
    where
        P: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: AsyncResultHandler + 'static,
    {
        self.push(
            name.to_string(),
            std::any::type_name::<H>(),
            Matcher::Predicate(Arc::new(predicate)),
            HandlerFactory::r#async(factory),
        )
    }

    fn push(
        mut self,
        name: String,
        handler_type: &'static str,
        matcher: Matcher,
        factory: HandlerFactory,
    ) -> Self {
        info!(
            endpoint = %name,
            handler = handler_type,
            kind = factory.kind(),
            "Registered endpoint"
        );
        self.branches.push(Branch {
            name,
            handler_type,
            matcher,
            factory,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Freeze the table.
    pub fn build(self) -> Arc<EndpointDispatcher> {
        Arc::new(EndpointDispatcher::new(
            self.branches.into(),
            self.failure_status,
            self.metrics,
        ))
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Guarantee a leading slash.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Exact segment match, ignoring ASCII case and one trailing slash:
/// `/foo` matches `/foo` and `/foo/`, but not `/foo/bar` or `/fo`.
pub fn matches_exact(registered: &str, request_path: &str) -> bool {
    let registered = registered.trim_end_matches('/');
    let Some(head) = request_path.get(..registered.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(registered) {
        return false;
    }
    matches!(&request_path[registered.len()..], "" | "/")
}
