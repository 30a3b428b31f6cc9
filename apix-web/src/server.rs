use crate::handlers;
use crate::middleware::request_logging;
use apix_core::config::ApixConfig;
use apix_endpoint::registry::normalize_path;
use apix_endpoint::{EndpointDispatcher, endpoint_layer};
use apix_observability::{ApiLogWriter, MetricsCollector};
use axum::{Router as AxumRouter, extract::State, middleware, routing::get};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub writer: Arc<ApiLogWriter>,
    pub metrics: Arc<MetricsCollector>,
    pub dispatcher: Arc<EndpointDispatcher>,
    pub request_logging: bool,
    pub max_logged_body_bytes: usize,
    pub metrics_path: String,
}

impl AppState {
    pub fn new(
        config: &ApixConfig,
        writer: Arc<ApiLogWriter>,
        metrics: Arc<MetricsCollector>,
        dispatcher: Arc<EndpointDispatcher>,
    ) -> Self {
        Self {
            writer,
            metrics,
            dispatcher,
            request_logging: config.logging.request_logging,
            max_logged_body_bytes: config.server.max_logged_body_bytes,
            metrics_path: config.metrics.path.clone(),
        }
    }
}

/// Assemble the application router.
///
/// Request flow: dynamic endpoints first, then `/health` and the metrics
/// route, then `app` wrapped in the request-logging middleware.
pub fn build_router(state: AppState, app: AxumRouter) -> AxumRouter {
    let logged = if state.request_logging {
        app.layer(middleware::from_fn_with_state(state.clone(), request_logging))
    } else {
        app
    };

    let ops = AxumRouter::new()
        .route("/health", get(handlers::health::health_check))
        .route(&normalize_path(&state.metrics_path), get(metrics_handler))
        .with_state(state.clone());

    ops.merge(logged)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.dispatcher),
            endpoint_layer,
        ))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server hosting the apix surface.
pub struct WebServer {
    addr: String,
    router: AxumRouter,
}

impl WebServer {
    pub fn new(addr: impl Into<String>, state: AppState, app: AxumRouter) -> Self {
        Self {
            addr: addr.into(),
            router: build_router(state, app),
        }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!(addr = %listener.local_addr()?, "Starting apix HTTP server");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
