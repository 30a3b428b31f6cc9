use crate::handler::{AsyncResultHandler, HandlerError, HandlerFactory};
use crate::registry::Branch;
use crate::response::{FAILED, no_cache_response};
use apix_observability::{MetricsCollector, panic_message};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use futures::FutureExt;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error};

/// Frozen endpoint table. Built by [`crate::EndpointRegistry::build`].
pub struct EndpointDispatcher {
    branches: Arc<[Branch]>,
    failure_status: StatusCode,
    metrics: Arc<MetricsCollector>,
}

impl EndpointDispatcher {
    pub(crate) fn new(
        branches: Arc<[Branch]>,
        failure_status: StatusCode,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            branches,
            failure_status,
            metrics,
        }
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// First branch, in registration order, that claims the request.
    ///
    /// A predicate that panics is logged and treated as not matching.
    pub fn match_request(&self, request: &Request) -> Option<(&Branch, String)> {
        self.branches.iter().find_map(|b| {
            match catch_unwind(AssertUnwindSafe(|| b.matcher.resolve(request))) {
                Ok(resolved) => resolved.map(|path| (b, path)),
                Err(payload) => {
                    error!(
                        endpoint = %b.name,
                        panic = %panic_message(payload.as_ref()),
                        "Endpoint predicate panicked"
                    );
                    None
                }
            }
        })
    }

    /// Serve the request if a branch claims it, otherwise hand it back.
    pub async fn dispatch(&self, request: Request) -> Result<Response, Request> {
        let Some((branch, path)) = self.match_request(&request) else {
            return Err(request);
        };
        drop(request);

        debug!(endpoint = %branch.name, path = %path, "Dispatching dynamic endpoint");
        match invoke(branch, &path).await {
            Ok(content) => {
                self.metrics.record_endpoint(&branch.name, true);
                Ok(no_cache_response(StatusCode::OK, content.as_deref()))
            }
            Err(e) => {
                error!(
                    endpoint = %branch.name,
                    handler = branch.handler_type,
                    path = %path,
                    error = %e,
                    "Dynamic endpoint failed"
                );
                self.metrics.record_endpoint(&branch.name, false);
                Ok(no_cache_response(self.failure_status, Some(FAILED)))
            }
        }
    }
}

async fn invoke(branch: &Branch, path: &str) -> Result<Option<String>, HandlerError> {
    let unresolved = || HandlerError::Unresolved {
        handler: branch.handler_type,
    };
    match &branch.factory {
        HandlerFactory::Sync(make) => {
            let run = || -> Result<Option<String>, HandlerError> {
                let mut handler = make().ok_or_else(unresolved)?;
                handler.set_path(path)?;
                handler.get_result()
            };
            catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| Err(panicked(payload)))
        }
        HandlerFactory::Async(make) => {
            let prepare = || -> Result<Box<dyn AsyncResultHandler>, HandlerError> {
                let mut handler = make().ok_or_else(unresolved)?;
                handler.set_path(path)?;
                Ok(handler)
            };
            let mut handler = catch_unwind(AssertUnwindSafe(prepare)).map_err(panicked)??;
            AssertUnwindSafe(handler.get_result())
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panicked(payload)))
        }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> HandlerError {
    HandlerError::Panicked(panic_message(payload.as_ref()))
}

/// Axum middleware serving dynamic endpoints ahead of the router.
///
/// Unmatched requests continue down the stack unchanged.
pub async fn endpoint_layer(
    State(dispatcher): State<Arc<EndpointDispatcher>>,
    request: Request,
    next: Next,
) -> Response {
    match dispatcher.dispatch(request).await {
        Ok(response) => response,
        Err(request) => next.run(request).await,
    }
}
